//! Attendance ledger CLI library.
//!
//! This crate provides the `tc` command-line interface over the record store.

mod cli;
pub mod commands;
mod config;
pub mod station;

pub use cli::{Cli, Commands};
pub use config::{Config, StationConfig};
