//! Content fingerprints for optimistic conflict detection.

use std::fmt;
use std::fs::Metadata;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StoreError, io_error};

/// Identity of a record file's exact on-disk state.
///
/// Two fingerprints are equal only if modification time, length and content
/// hash all match, so a rewrite with identical length inside the same
/// timestamp tick is still detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub modified_ms: i64,
    pub len: u64,
    pub sha256: String,
}

impl Fingerprint {
    /// Fingerprint of content just read from a file with the given metadata.
    pub fn of(bytes: &[u8], metadata: &Metadata) -> Self {
        let modified_ms = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            modified_ms,
            len: bytes.len() as u64,
            sha256: format!("{:x}", hasher.finalize()),
        }
    }

    /// Reads the current fingerprint of a file; `None` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let metadata = std::fs::metadata(path).map_err(io_error(path))?;
                Ok(Some(Self::of(&bytes, &metadata)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.sha256[..self.sha256.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.short(), self.modified_ms, self.len)
    }
}
