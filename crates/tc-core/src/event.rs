//! Raw scan events handed over by the scanning front end.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::{EmployeeId, StationId, ValidationError};

/// Direction of a clock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockAction {
    In,
    Out,
}

impl ClockAction {
    /// String representation used in record files and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl fmt::Display for ClockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClockAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" | "clock-in" | "clock_in" => Ok(Self::In),
            "out" | "clock-out" | "clock_out" => Ok(Self::Out),
            _ => Err(ValidationError::InvalidClockAction {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for ClockAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClockAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A decoded identifier scan.
///
/// Timestamps keep the UTC offset of the station that produced them so that
/// day attribution happens on the employee's wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Employee whose identifier was scanned.
    pub employee_id: EmployeeId,
    /// When the scan happened.
    pub timestamp: DateTime<FixedOffset>,
    /// Explicit direction, if the front end knows it. Inferred by alternation otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ClockAction>,
    /// Station that captured the scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<StationId>,
}

impl ScanEvent {
    /// Creates an event without an explicit direction.
    pub const fn new(employee_id: EmployeeId, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            employee_id,
            timestamp,
            kind: None,
            station: None,
        }
    }

    /// Sets the explicit direction.
    #[must_use]
    pub const fn with_kind(mut self, kind: ClockAction) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the capturing station.
    #[must_use]
    pub fn with_station(mut self, station: StationId) -> Self {
        self.station = Some(station);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_action_parses_aliases() {
        assert_eq!("in".parse::<ClockAction>().unwrap(), ClockAction::In);
        assert_eq!("clock-out".parse::<ClockAction>().unwrap(), ClockAction::Out);
        let err = "sideways".parse::<ClockAction>().unwrap_err();
        assert_eq!(err.to_string(), "invalid clock action: sideways");
    }

    #[test]
    fn scan_event_keeps_offset_through_serde() {
        let event = ScanEvent::new(
            EmployeeId::new("042").unwrap(),
            DateTime::parse_from_rfc3339("2025-03-03T23:40:00+01:00").unwrap(),
        )
        .with_kind(ClockAction::In);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"in\""));
        assert!(!json.contains("station"));

        let parsed: ScanEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.timestamp.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn scan_event_rejects_empty_employee() {
        let json = r#"{
            "employee_id": "",
            "timestamp": "2025-01-01T08:00:00Z"
        }"#;
        let result: Result<ScanEvent, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
