//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The identifier contains characters that cannot appear in a record file name.
    #[error("{field} contains invalid characters: {value}")]
    InvalidCharacters { field: &'static str, value: String },

    /// An absence percentage outside 0..=100.
    #[error("absence percent must be between 0 and 100, got {value}")]
    PercentOutOfRange { value: u8 },

    /// A duration that is not written as `H:MM`.
    #[error("invalid duration: {value} (expected H:MM)")]
    InvalidDuration { value: String },

    /// A day boundary outside the first 24 hours.
    #[error("day boundary must be within 00:00..24:00, got {minutes} minutes")]
    DayBoundaryOutOfRange { minutes: i64 },

    /// A period identifier that could not be parsed.
    #[error("invalid period: {value} (expected YYYY or YYYY-MM)")]
    InvalidPeriod { value: String },

    /// An unknown clock action string.
    #[error("invalid clock action: {value}")]
    InvalidClockAction { value: String },

    /// An event was offered to another employee's ledger.
    #[error("event for employee {found} cannot be recorded in the ledger of {expected}")]
    EmployeeMismatch { expected: String, found: String },

    /// A manual session whose end is not after its start.
    #[error("manual session must end after it starts ({start} .. {end})")]
    EmptyManualSession { start: String, end: String },

    /// An unknown absence kind string.
    #[error("invalid absence kind: {value}")]
    InvalidAbsenceKind { value: String },
}

/// Returns true for characters allowed in identifiers that end up in file names.
fn is_file_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Generates a validated string ID newtype with common trait implementations.
///
/// IDs are used as record file names, so they are restricted to ASCII
/// alphanumerics plus `-`, `_` and `.`, and may not start with a dot.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                if id.starts_with('.') || !id.chars().all(is_file_safe) {
                    return Err(ValidationError::InvalidCharacters {
                        field: $field_name,
                        value: id,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated employee identifier.
    ///
    /// This is the decoded value handed over by the scanning front end. It
    /// also names the employee's record file in the shared store.
    EmployeeId, "employee ID"
);

define_string_id!(
    /// A validated station label.
    ///
    /// Stations are the physical terminals sharing the record store. The
    /// label shows up in lease markers and in the `saved_by` field of records.
    StationId, "station ID"
);
