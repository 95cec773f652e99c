//! Storage and coordination layer for attendance ledgers.
//!
//! Each employee's ledger is one JSON file on a directory shared by several
//! stations (e.g. a network share). There is no database server: consistency
//! comes from two mechanisms.
//!
//! # Concurrency
//!
//! - **Leases**: an advisory marker file per record serializes
//!   read-modify-write cycles across stations. Abandoned leases are reclaimed
//!   after a grace period and the takeover is recorded in the ledger.
//! - **Fingerprints**: every save compares the on-disk fingerprint with the
//!   one read at load time and fails with [`StoreError::Conflict`] on mismatch.
//!   This catches writers that bypassed or lost their lease.
//!
//! Records of different employees are independent, so bulk operations
//! process them in parallel.

pub mod coordinator;
mod error;
pub mod fingerprint;
pub mod lease;
pub mod service;
pub mod store;

pub use coordinator::{Committed, Coordinator};
pub use error::StoreError;
pub use fingerprint::Fingerprint;
pub use lease::{Lease, LeaseConfig, LeaseMarker, LeaseState};
pub use service::{Attendance, Profiles, RecomputeOutcome, RecomputeSummary, Submission};
pub use store::{LoadedLedger, RecordStore, StoreConfig};
