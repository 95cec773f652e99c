//! Advisory, time-bounded leases on employee records.
//!
//! A lease is a marker file created with create-new semantics next to the
//! record. Only one station can create it; the others retry until their
//! timeout. A marker older than the stale grace period is treated as
//! abandoned (e.g. a station lost power mid-cycle) and reclaimed.
//!
//! Reclaiming happens under the record's fs2 guard lock and re-reads the
//! marker first, so two stations cannot both reclaim the same lease.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tc_core::{EmployeeId, StationId};
use uuid::Uuid;

use crate::error::{StoreError, io_error};
use crate::store::{RecordStore, lock_exclusive};

/// Lease timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// How long to wait for a held lease before giving up.
    /// Default: 10000 (10 seconds).
    pub timeout_ms: u64,

    /// Age after which a lease counts as abandoned.
    /// Default: 120000 (2 minutes).
    pub stale_grace_ms: u64,

    /// Pause between attempts.
    /// Default: 100.
    pub retry_delay_ms: u64,

    /// Whole-cycle attempts for retrying callers.
    /// Default: 3.
    pub retry_attempts: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,      // 10 seconds
            stale_grace_ms: 120_000, // 2 minutes
            retry_delay_ms: 100,
            retry_attempts: 3,
        }
    }
}

impl LeaseConfig {
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Content of a lease marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseMarker {
    pub owner: StationId,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl LeaseMarker {
    fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.acquired_at).num_milliseconds()
    }

    fn is_stale(&self, now: DateTime<Utc>, grace_ms: u64) -> bool {
        self.age_ms(now) > i64::try_from(grace_ms).unwrap_or(i64::MAX)
    }
}

/// Observed lease state of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseState {
    Idle,
    Leased { marker: LeaseMarker, stale: bool },
}

/// An acquired lease. Released on drop.
#[derive(Debug)]
pub struct Lease {
    path: PathBuf,
    guard_path: PathBuf,
    employee_id: EmployeeId,
    token: Uuid,
    reclaimed: Option<LeaseMarker>,
    released: bool,
}

impl Lease {
    /// The abandoned lease this one replaced, if any.
    pub const fn reclaimed(&self) -> Option<&LeaseMarker> {
        self.reclaimed.as_ref()
    }

    /// Releases the lease.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), StoreError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let _guard = lock_exclusive(&self.guard_path)?;
        match read_marker(&self.path)? {
            Some(marker) if marker.token == self.token => {
                fs::remove_file(&self.path).map_err(io_error(&self.path))?;
                tracing::trace!(employee_id = %self.employee_id, "released lease");
            }
            Some(marker) => tracing::warn!(
                employee_id = %self.employee_id,
                holder = %marker.owner,
                "lease was reclaimed by another station before release"
            ),
            None => tracing::warn!(
                employee_id = %self.employee_id,
                "lease marker vanished before release"
            ),
        }
        Ok(())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            tracing::warn!(employee_id = %self.employee_id, error = %err, "failed to release lease");
        }
    }
}

/// Reads a marker; unreadable content falls back to the file's mtime so a
/// half-written marker from a crashed station still ages out.
fn read_marker(path: &Path) -> Result<Option<LeaseMarker>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };
    if let Ok(marker) = serde_json::from_str::<LeaseMarker>(&content) {
        return Ok(Some(marker));
    }
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => DateTime::<Utc>::from(t),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };
    tracing::warn!(path = ?path, "unreadable lease marker");
    Ok(Some(LeaseMarker {
        owner: StationId::new("unknown").map_err(StoreError::Invalid)?,
        token: Uuid::nil(),
        acquired_at: modified,
    }))
}

/// Current lease state of an employee's record.
pub fn lease_state(
    store: &RecordStore,
    employee_id: &EmployeeId,
    config: &LeaseConfig,
) -> Result<LeaseState, StoreError> {
    let now = Utc::now();
    Ok(match read_marker(&store.lease_path(employee_id))? {
        None => LeaseState::Idle,
        Some(marker) => LeaseState::Leased {
            stale: marker.is_stale(now, config.stale_grace_ms),
            marker,
        },
    })
}

/// Acquires the lease on an employee's record, waiting up to the timeout.
pub fn acquire(
    store: &RecordStore,
    employee_id: &EmployeeId,
    station: &StationId,
    config: &LeaseConfig,
) -> Result<Lease, StoreError> {
    let path = store.lease_path(employee_id);
    let started = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut reclaimed = None;

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let marker = LeaseMarker {
                    owner: station.clone(),
                    token: Uuid::new_v4(),
                    acquired_at: Utc::now(),
                };
                let json = serde_json::to_vec(&marker).map_err(StoreError::Encode)?;
                if let Err(e) = file.write_all(&json).and_then(|()| file.sync_all()) {
                    let _ = fs::remove_file(&path);
                    return Err(io_error(&path)(e));
                }
                tracing::trace!(employee_id = %employee_id, token = %marker.token, "acquired lease");
                return Ok(Lease {
                    path,
                    guard_path: store.guard_path(employee_id),
                    employee_id: employee_id.clone(),
                    token: marker.token,
                    reclaimed,
                    released: false,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_error(&path)(e)),
        }

        if let Some(previous) = reclaim_if_stale(store, employee_id, &path, config)? {
            reclaimed = Some(previous);
            continue;
        }

        if started.elapsed() >= timeout {
            let holder = read_marker(&path)?.map_or_else(|| "nobody".to_string(), |m| m.owner.to_string());
            return Err(StoreError::LeaseTimeout {
                employee_id: employee_id.clone(),
                holder,
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        }
        std::thread::sleep(config.retry_delay());
    }
}

/// Removes an abandoned marker. Returns it when it was reclaimed.
fn reclaim_if_stale(
    store: &RecordStore,
    employee_id: &EmployeeId,
    path: &Path,
    config: &LeaseConfig,
) -> Result<Option<LeaseMarker>, StoreError> {
    let _guard = store.lock_guard(employee_id)?;
    let Some(marker) = read_marker(path)? else {
        return Ok(None);
    };
    if !marker.is_stale(Utc::now(), config.stale_grace_ms) {
        return Ok(None);
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    }
    tracing::warn!(
        employee_id = %employee_id,
        holder = %marker.owner,
        acquired_at = %marker.acquired_at,
        "reclaimed abandoned lease"
    );
    Ok(Some(marker))
}
