//! Per-employee record files on a shared directory.
//!
//! # Layout
//!
//! ```text
//! <directory>/<group?>/<employee_id>.ledger.json   the record, pretty JSON
//! <directory>/<group?>/<employee_id>.ledger.lock   lease marker (see `lease`)
//! <directory>/<group?>/<employee_id>.ledger.guard  short-lived fs2 lock file
//! ```
//!
//! Records are replaced atomically: the new content is written to a
//! temporary file in the same directory and renamed over the record, so
//! readers see either the old or the new file, never a partial one.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tc_core::ledger::FORMAT_VERSION;
use tc_core::{EmployeeId, EmployeeLedger, StationId, ValidationError};
use tempfile::NamedTempFile;

use crate::error::{StoreError, io_error};
use crate::fingerprint::Fingerprint;

const RECORD_SUFFIX: &str = ".ledger.json";

static RECORD_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_-][A-Za-z0-9._-]*)\.ledger\.json$").unwrap());

/// Where records live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory, typically on a network share.
    pub directory: PathBuf,
    /// Optional subdirectory partitioning employees, e.g. per site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A ledger together with the fingerprint of the file it was read from.
#[derive(Debug, Clone)]
pub struct LoadedLedger {
    pub ledger: EmployeeLedger,
    pub fingerprint: Fingerprint,
}

/// Handle on a record directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Opens the store, creating the directory if necessary.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let dir = match &config.group {
            Some(group) => {
                validate_group(group)?;
                config.directory.join(group)
            }
            None => config.directory.clone(),
        };
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an employee's record file.
    pub fn record_path(&self, employee_id: &EmployeeId) -> PathBuf {
        self.dir.join(format!("{employee_id}{RECORD_SUFFIX}"))
    }

    /// Whether a record exists for the employee.
    pub fn contains(&self, employee_id: &EmployeeId) -> bool {
        self.record_path(employee_id).is_file()
    }

    /// Reads an employee's ledger and its fingerprint.
    pub fn load(&self, employee_id: &EmployeeId) -> Result<LoadedLedger, StoreError> {
        let path = self.record_path(employee_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::UnknownEmployee(employee_id.clone()));
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        let metadata = fs::metadata(&path).map_err(io_error(&path))?;
        let fingerprint = Fingerprint::of(&bytes, &metadata);

        let ledger = decode(&path, &bytes)?;
        if ledger.employee_id != *employee_id {
            return Err(StoreError::CorruptRecord {
                path,
                message: format!("record belongs to employee {}", ledger.employee_id),
            });
        }
        Ok(LoadedLedger {
            ledger,
            fingerprint,
        })
    }

    /// Writes a brand-new record. Fails if one already exists.
    pub fn create(
        &self,
        ledger: &mut EmployeeLedger,
        station: &StationId,
        now: DateTime<FixedOffset>,
    ) -> Result<Fingerprint, StoreError> {
        if self.contains(&ledger.employee_id) {
            return Err(StoreError::AlreadyEnrolled(ledger.employee_id.clone()));
        }
        self.save(ledger, None, station, now)
    }

    /// Replaces the record if its on-disk fingerprint still equals `expected`.
    ///
    /// `expected = None` means the record must not exist yet. On success the
    /// ledger's revision is incremented, `saved_at`/`saved_by` are stamped and
    /// the new fingerprint is returned. On any error the ledger is unchanged.
    pub fn save(
        &self,
        ledger: &mut EmployeeLedger,
        expected: Option<&Fingerprint>,
        station: &StationId,
        now: DateTime<FixedOffset>,
    ) -> Result<Fingerprint, StoreError> {
        let path = self.record_path(&ledger.employee_id);
        let _guard = self.lock_guard(&ledger.employee_id)?;

        let current = Fingerprint::read(&path)?;
        if current.as_ref() != expected {
            tracing::warn!(
                employee_id = %ledger.employee_id,
                expected = ?expected.map(ToString::to_string),
                found = ?current.as_ref().map(ToString::to_string),
                "record changed since it was read"
            );
            return Err(StoreError::Conflict {
                employee_id: ledger.employee_id.clone(),
            });
        }

        let mut next = ledger.clone();
        next.revision += 1;
        next.saved_at = Some(now);
        next.saved_by = Some(station.clone());
        let mut json = serde_json::to_vec_pretty(&next).map_err(StoreError::Encode)?;
        json.push(b'\n');

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error(&self.dir))?;
        tmp.write_all(&json).map_err(io_error(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_error(tmp.path()))?;
        let file = tmp.persist(&path).map_err(|e| io_error(&path)(e.error))?;
        let metadata = file.metadata().map_err(io_error(&path))?;

        let fingerprint = Fingerprint::of(&json, &metadata);
        tracing::debug!(
            employee_id = %next.employee_id,
            revision = next.revision,
            fingerprint = %fingerprint,
            "saved record"
        );
        *ledger = next;
        Ok(fingerprint)
    }

    /// Employees with a record file, sorted.
    pub fn list(&self) -> Result<Vec<EmployeeId>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(io_error(&self.dir))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(captures) = RECORD_FILE.captures(name) else {
                continue;
            };
            match EmployeeId::new(&captures[1]) {
                Ok(id) => ids.push(id),
                Err(err) => tracing::warn!(file = name, error = %err, "skipping record with invalid name"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Takes the record's short-lived exclusive lock.
    ///
    /// Held only for a compare-and-replace or a lease hand-over; released
    /// when the returned file is dropped.
    pub(crate) fn lock_guard(&self, employee_id: &EmployeeId) -> Result<File, StoreError> {
        lock_exclusive(&self.guard_path(employee_id))
    }

    pub(crate) fn guard_path(&self, employee_id: &EmployeeId) -> PathBuf {
        self.dir.join(format!("{employee_id}.ledger.guard"))
    }

    /// Path of the lease marker for an employee's record.
    pub(crate) fn lease_path(&self, employee_id: &EmployeeId) -> PathBuf {
        self.dir.join(format!("{employee_id}.ledger.lock"))
    }
}

/// Opens (creating if needed) and exclusively locks a guard file.
pub(crate) fn lock_exclusive(path: &Path) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(io_error(path))?;
    file.lock_exclusive().map_err(io_error(path))?;
    Ok(file)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<EmployeeLedger, StoreError> {
    #[derive(Deserialize)]
    struct Header {
        format_version: u32,
    }

    let header: Header = serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptRecord {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if header.format_version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            path: path.to_path_buf(),
            found: header.format_version,
        });
    }
    serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptRecord {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn validate_group(group: &str) -> Result<(), ValidationError> {
    if group.is_empty() {
        return Err(ValidationError::Empty {
            field: "store group",
        });
    }
    if !group
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(ValidationError::InvalidCharacters {
            field: "store group",
            value: group.to_string(),
        });
    }
    Ok(())
}
