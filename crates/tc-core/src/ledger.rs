//! The employee ledger and the records derived from it.
//!
//! Scan events and day amendments are the ledger's source data. Day records
//! and period balances are derived: every evaluation rebuilds them from
//! scratch, so they never carry stale diagnostics. Store anomalies are the
//! only diagnostics appended rather than derived.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::event::ScanEvent;
use crate::types::{EmployeeId, StationId, ValidationError};

/// Version of the record file layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// A month or a calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodId {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl PeriodId {
    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First calendar day of the period.
    pub fn first_day(&self) -> NaiveDate {
        let (year, month) = match *self {
            Self::Month { year, month } => (year, month),
            Self::Year(year) => (year, 1),
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the period.
    pub fn last_day(&self) -> NaiveDate {
        let next = match *self {
            Self::Month { year, month: 12 } | Self::Year(year) => {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            }
            Self::Month { year, month } => NaiveDate::from_ymd_opt(year, month + 1, 1),
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }

    /// Whether `date` falls within the period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.first_day()..=self.last_day()).contains(&date)
    }

    /// The following period of the same granularity.
    #[must_use]
    pub const fn next(&self) -> Self {
        match *self {
            Self::Month { year, month: 12 } => Self::Month {
                year: year + 1,
                month: 1,
            },
            Self::Month { year, month } => Self::Month {
                year,
                month: month + 1,
            },
            Self::Year(year) => Self::Year(year + 1),
        }
    }

    /// Whether this is a monthly period.
    pub const fn is_month(&self) -> bool {
        matches!(self, Self::Month { .. })
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Self::Year(year) => write!(f, "{year:04}"),
        }
    }
}

impl FromStr for PeriodId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPeriod {
            value: s.to_string(),
        };
        match s.split_once('-') {
            Some((year, month)) => {
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let month: u32 = month.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Self::Month { year, month })
            }
            None => s.parse().map(Self::Year).map_err(|_| invalid()),
        }
    }
}

impl Serialize for PeriodId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeriodId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Share of a day, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const FULL: Self = Self(100);
    pub const HALF: Self = Self(50);

    /// Creates a percentage after validation.
    pub const fn new(value: u8) -> Result<Self, ValidationError> {
        if value > 100 {
            return Err(ValidationError::PercentOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Applies the percentage to a millisecond amount, rounding toward zero.
    #[must_use]
    pub const fn of(self, ms: i64) -> i64 {
        ms * self.0 as i64 / 100
    }
}

impl TryFrom<u8> for Percent {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(p: Percent) -> Self {
        p.0
    }
}

/// Reason for not working on a scheduled day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceKind {
    /// Counts against the yearly vacation allowance.
    Vacation,
    Sick,
    Holiday,
    Other,
}

impl AbsenceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::Sick => "sick",
            Self::Holiday => "holiday",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AbsenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbsenceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacation" => Ok(Self::Vacation),
            "sick" => Ok(Self::Sick),
            "holiday" => Ok(Self::Holiday),
            "other" => Ok(Self::Other),
            _ => Err(ValidationError::InvalidAbsenceKind {
                value: s.to_string(),
            }),
        }
    }
}

/// An absence credited on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Absence {
    pub kind: AbsenceKind,
    /// Share of the scheduled target that is credited.
    pub percent: Percent,
}

impl Absence {
    /// A full-day absence.
    pub const fn full(kind: AbsenceKind) -> Self {
        Self {
            kind,
            percent: Percent::FULL,
        }
    }
}

/// A session entered by hand, e.g. to correct a forgotten scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManualSession {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ManualSession {
    /// Creates a manual session; the end must come after the start.
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EmptyManualSession {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }
}

/// Human corrections for one date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayAmendment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absence: Option<Absence>,
    /// Signed correction added to the day's delta.
    #[serde(skip_serializing_if = "is_zero")]
    pub adjustment_ms: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manual_sessions: Vec<ManualSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[expect(
    clippy::trivially_copy_pass_by_ref,
    reason = "serde skip_serializing_if passes a reference"
)]
const fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl DayAmendment {
    /// Whether the amendment carries no correction at all.
    pub fn is_empty(&self) -> bool {
        self.absence.is_none()
            && self.adjustment_ms == 0
            && self.manual_sessions.is_empty()
            && self.note.is_none()
    }
}

/// Where a session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    Scanned,
    Manual,
}

/// A reconciled work session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    /// Working day the session is attributed to (the day it started).
    pub day: NaiveDate,
    pub start: DateTime<FixedOffset>,
    /// `None` while the session is open.
    pub end: Option<DateTime<FixedOffset>>,
    /// Worked time; for open sessions, measured up to the evaluation instant.
    pub duration_ms: i64,
    /// The session crosses the day boundary.
    #[serde(default)]
    pub rollover: bool,
    /// The end was set by the auto-close policy, not by a scan.
    #[serde(default)]
    pub auto_closed: bool,
    pub origin: SessionOrigin,
}

impl WorkSession {
    /// Whether the session still lacks a clock-out.
    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Everything known about one employee on one working day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub sessions: Vec<WorkSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absence: Option<Absence>,
    /// Number of scan events attributed to the day.
    #[serde(default)]
    pub event_count: u32,
    pub worked_ms: i64,
    pub target_ms: i64,
    #[serde(default)]
    pub adjustment_ms: i64,
    /// `worked − target + adjustment`.
    pub delta_ms: i64,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl DayRecord {
    /// An empty record for `date`.
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sessions: Vec::new(),
            absence: None,
            event_count: 0,
            worked_ms: 0,
            target_ms: 0,
            adjustment_ms: 0,
            delta_ms: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Whether the day has a blocking diagnostic.
    pub fn is_blocked(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_blocking)
    }

    /// Whether the employee is clocked in on this day.
    pub fn has_open_session(&self) -> bool {
        self.sessions.iter().any(WorkSession::is_open)
    }
}

/// Vacation bookkeeping for one year, in hundredths of a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationSummary {
    pub allowance_centidays: i64,
    /// Vacation on days up to the evaluation date.
    pub taken_centidays: i64,
    /// Vacation booked after the evaluation date.
    pub planned_centidays: i64,
    pub remaining_centidays: i64,
}

/// Running balance of a month or year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub period: PeriodId,
    pub opening_ms: i64,
    pub worked_ms: i64,
    pub target_ms: i64,
    pub adjustment_ms: i64,
    /// `opening + worked − target + adjustment`.
    pub closing_ms: i64,
    /// Not final: a blocking diagnostic exists in the period or before it.
    pub provisional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vacation: Option<VacationSummary>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of offering a scan event to a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Recorded,
    /// The same scan was already recorded.
    Duplicate,
    /// Too close to an existing scan.
    Debounced,
}

/// The full attendance record of one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeLedger {
    pub format_version: u32,
    pub employee_id: EmployeeId,
    /// First day covered by balances.
    pub started_on: NaiveDate,
    /// Balance carried into the first period.
    pub opening_balance_ms: i64,
    /// Incremented on every save.
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_by: Option<StationId>,
    /// Instant the derived sections were computed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<FixedOffset>>,
    /// Scan events in timestamp order.
    #[serde(default)]
    pub events: Vec<ScanEvent>,
    #[serde(default)]
    pub amendments: BTreeMap<NaiveDate, DayAmendment>,
    #[serde(default)]
    pub days: Vec<DayRecord>,
    #[serde(default)]
    pub balances: Vec<PeriodBalance>,
    /// Store anomalies such as reclaimed leases. Appended, never recomputed.
    #[serde(default)]
    pub anomalies: Vec<Diagnostic>,
}

impl EmployeeLedger {
    /// Creates an empty ledger.
    pub const fn new(employee_id: EmployeeId, started_on: NaiveDate, opening_balance_ms: i64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            employee_id,
            started_on,
            opening_balance_ms,
            revision: 0,
            saved_at: None,
            saved_by: None,
            evaluated_at: None,
            events: Vec::new(),
            amendments: BTreeMap::new(),
            days: Vec::new(),
            balances: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    /// Records a scan event, keeping events ordered by instant.
    ///
    /// Exact duplicates and scans within `debounce_ms` of an existing scan
    /// are reported back instead of being stored again.
    pub fn admit(&mut self, event: ScanEvent, debounce_ms: i64) -> Result<Admission, ValidationError> {
        if event.employee_id != self.employee_id {
            return Err(ValidationError::EmployeeMismatch {
                expected: self.employee_id.to_string(),
                found: event.employee_id.to_string(),
            });
        }

        let at = self
            .events
            .partition_point(|existing| existing.timestamp <= event.timestamp);
        let neighbours = at.saturating_sub(1)..(at + 1).min(self.events.len());
        for existing in &self.events[neighbours] {
            if existing.timestamp == event.timestamp && existing.kind == event.kind {
                return Ok(Admission::Duplicate);
            }
            let gap = (existing.timestamp - event.timestamp).num_milliseconds().abs();
            if gap < debounce_ms {
                return Ok(Admission::Debounced);
            }
        }

        self.events.insert(at, event);
        Ok(Admission::Recorded)
    }

    /// Stores an amendment, replacing any earlier one for the same date.
    /// An empty amendment removes the entry.
    pub fn amend(&mut self, date: NaiveDate, amendment: DayAmendment) {
        if amendment.is_empty() {
            self.amendments.remove(&date);
        } else {
            self.amendments.insert(date, amendment);
        }
    }

    /// Appends a store anomaly.
    pub fn record_anomaly(&mut self, diagnostic: Diagnostic) {
        self.anomalies.push(diagnostic);
    }

    /// Derived record for a date, if the day has been touched.
    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.days[i])
    }

    /// Derived balance for a period, if it has been computed.
    pub fn balance(&self, period: PeriodId) -> Option<&PeriodBalance> {
        self.balances.iter().find(|b| b.period == period)
    }

    /// All diagnostics: per day, per period and store anomalies.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.days
            .iter()
            .flat_map(|d| d.diagnostics.iter())
            .chain(self.balances.iter().flat_map(|b| b.diagnostics.iter()))
            .chain(self.anomalies.iter())
    }

    /// The day holding the scanned session a scan at `at` opened or closed.
    ///
    /// A clock-out after the day boundary resolves to the day the session
    /// started on, not the calendar day of the scan.
    pub fn day_of_scan(&self, at: DateTime<FixedOffset>) -> Option<&DayRecord> {
        self.days.iter().find(|day| {
            day.sessions.iter().any(|s| {
                s.origin == SessionOrigin::Scanned && (s.start == at || s.end == Some(at))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn ledger() -> EmployeeLedger {
        EmployeeLedger::new(
            EmployeeId::new("042").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            0,
        )
    }

    fn scan(s: &str) -> ScanEvent {
        ScanEvent::new(EmployeeId::new("042").unwrap(), ts(s))
    }

    #[test]
    fn period_id_parses_and_displays() {
        let month: PeriodId = "2025-03".parse().unwrap();
        assert_eq!(month, PeriodId::Month { year: 2025, month: 3 });
        assert_eq!(month.to_string(), "2025-03");
        assert_eq!("2025".parse::<PeriodId>().unwrap(), PeriodId::Year(2025));
        assert!("2025-13".parse::<PeriodId>().is_err());
        assert!("march".parse::<PeriodId>().is_err());
    }

    #[test]
    fn period_bounds() {
        let feb = PeriodId::Month { year: 2024, month: 2 };
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let dec = PeriodId::Month { year: 2025, month: 12 };
        assert_eq!(dec.next(), PeriodId::Month { year: 2026, month: 1 });
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(PeriodId::Year(2025).contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }

    #[test]
    fn percent_validates_and_applies() {
        assert!(Percent::new(101).is_err());
        assert_eq!(Percent::HALF.of(8 * 3_600_000), 4 * 3_600_000);
        let parsed: Result<Percent, _> = serde_json::from_str("150");
        assert!(parsed.is_err());
    }

    #[test]
    fn admit_keeps_events_ordered() {
        let mut ledger = ledger();
        ledger.admit(scan("2025-03-03T12:00:00+01:00"), 0).unwrap();
        ledger.admit(scan("2025-03-03T08:00:00+01:00"), 0).unwrap();
        ledger.admit(scan("2025-03-03T10:00:00+01:00"), 0).unwrap();
        let hours: Vec<_> = ledger
            .events
            .iter()
            .map(|e| e.timestamp.format("%H").to_string())
            .collect();
        assert_eq!(hours, ["08", "10", "12"]);
    }

    #[test]
    fn admit_reports_duplicates_and_debounced_scans() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.admit(scan("2025-03-03T08:00:00+01:00"), 3_000).unwrap(),
            Admission::Recorded
        );
        assert_eq!(
            ledger.admit(scan("2025-03-03T08:00:00+01:00"), 3_000).unwrap(),
            Admission::Duplicate
        );
        assert_eq!(
            ledger.admit(scan("2025-03-03T08:00:02+01:00"), 3_000).unwrap(),
            Admission::Debounced
        );
        assert_eq!(
            ledger.admit(scan("2025-03-03T08:00:05+01:00"), 3_000).unwrap(),
            Admission::Recorded
        );
        assert_eq!(ledger.events.len(), 2);
    }

    #[test]
    fn admit_rejects_foreign_employee() {
        let mut ledger = ledger();
        let event = ScanEvent::new(EmployeeId::new("007").unwrap(), ts("2025-03-03T08:00:00Z"));
        assert!(matches!(
            ledger.admit(event, 0),
            Err(ValidationError::EmployeeMismatch { .. })
        ));
    }

    #[test]
    fn empty_amendment_removes_entry() {
        let mut ledger = ledger();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        ledger.amend(
            date,
            DayAmendment {
                absence: Some(Absence::full(AbsenceKind::Sick)),
                ..DayAmendment::default()
            },
        );
        assert!(ledger.amendments.contains_key(&date));
        ledger.amend(date, DayAmendment::default());
        assert!(ledger.amendments.is_empty());
    }

    #[test]
    fn manual_session_requires_positive_length() {
        let start = ts("2025-03-03T08:00:00+01:00");
        assert!(ManualSession::new(start, start).is_err());
        assert!(ManualSession::new(start, ts("2025-03-03T09:00:00+01:00")).is_ok());
    }
}
