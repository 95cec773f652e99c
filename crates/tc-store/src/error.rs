use std::io;
use std::path::{Path, PathBuf};

use tc_core::{EmployeeId, EngineError, ValidationError};
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed on disk after it was read.
    #[error("record of employee {employee_id} was modified by another station")]
    Conflict { employee_id: EmployeeId },

    /// Another station held the lease for longer than the timeout.
    #[error("timed out after {waited_ms} ms waiting for the lease on employee {employee_id} (held by {holder})")]
    LeaseTimeout {
        employee_id: EmployeeId,
        holder: String,
        waited_ms: u64,
    },

    /// The record file exists but cannot be understood.
    #[error("corrupt record {}: {message}", path.display())]
    CorruptRecord { path: PathBuf, message: String },

    /// The record was written by a newer or older format.
    #[error("unsupported format version {found} in {}", path.display())]
    UnsupportedFormat { path: PathBuf, found: u32 },

    #[error("employee {0} is not enrolled")]
    UnknownEmployee(EmployeeId),

    #[error("employee {0} is already enrolled")]
    AlreadyEnrolled(EmployeeId),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl StoreError {
    /// Whether repeating the whole cycle may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::LeaseTimeout { .. })
    }

    /// Whether the failure concerns one record's content only.
    pub const fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. } | Self::UnsupportedFormat { .. }
        )
    }
}

/// Maps an I/O error to [`StoreError::Io`] for the given path.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
