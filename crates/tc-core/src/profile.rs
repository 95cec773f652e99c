//! Per-employee configuration consumed by the engine.
//!
//! Every pipeline invocation receives an [`EmployeeProfile`] by reference.
//! Nothing in the engine reads configuration from ambient state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

const MS_PER_MINUTE: i64 = 60_000;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Formats a signed millisecond amount as `H:MM`, truncating seconds.
///
/// Negative values get a leading `-`; positive values have no sign.
pub fn format_hm(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let minutes = ms.unsigned_abs() / 60_000;
    format!("{sign}{}:{:02}", minutes / 60, minutes % 60)
}

/// A signed duration written as `H:MM` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WorkDuration(i64);

impl WorkDuration {
    /// Creates a duration from whole minutes.
    #[must_use]
    pub const fn from_minutes(minutes: i64) -> Self {
        Self(minutes * MS_PER_MINUTE)
    }

    /// Creates a duration from milliseconds.
    #[must_use]
    pub const fn from_ms(ms: i64) -> Self {
        Self(ms)
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn as_ms(self) -> i64 {
        self.0
    }

    /// Returns the duration as a chrono [`Duration`].
    #[must_use]
    pub fn to_duration(self) -> Duration {
        Duration::milliseconds(self.0)
    }
}

impl fmt::Display for WorkDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hm(self.0))
    }
}

impl FromStr for WorkDuration {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidDuration {
            value: s.to_string(),
        };
        let (negative, body) = s
            .strip_prefix('-')
            .map_or((false, s.trim_start_matches('+')), |rest| (true, rest));
        let (hours, minutes) = body.split_once(':').ok_or_else(invalid)?;
        let hours: i64 = hours.parse().map_err(|_| invalid())?;
        let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) || hours < 0 {
            return Err(invalid());
        }
        let total = hours * 60 + minutes;
        Ok(Self::from_minutes(if negative { -total } else { total }))
    }
}

impl Serialize for WorkDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WorkDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Offset of an employee's working day from local midnight.
///
/// Night-shift teams use e.g. `04:00`: a scan at 02:30 then still belongs to
/// the previous working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayBoundary {
    minutes: i64,
}

impl DayBoundary {
    /// Midnight.
    pub const MIDNIGHT: Self = Self { minutes: 0 };

    /// Creates a boundary at the given minutes after local midnight.
    pub const fn from_minutes(minutes: i64) -> Result<Self, ValidationError> {
        if minutes < 0 || minutes >= MINUTES_PER_DAY {
            return Err(ValidationError::DayBoundaryOutOfRange { minutes });
        }
        Ok(Self { minutes })
    }

    /// Minutes after local midnight.
    #[must_use]
    pub const fn minutes(self) -> i64 {
        self.minutes
    }

    /// Working day an instant belongs to, on the instant's own wall clock.
    #[must_use]
    pub fn day_of(self, timestamp: &DateTime<FixedOffset>) -> NaiveDate {
        (timestamp.naive_local() - Duration::minutes(self.minutes)).date()
    }

    /// Local wall-clock instant at which the given working day begins.
    #[must_use]
    pub fn start_of(self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(NaiveTime::MIN) + Duration::minutes(self.minutes)
    }
}

impl fmt::Display for DayBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

impl FromStr for DayBoundary {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: WorkDuration = s.parse()?;
        Self::from_minutes(parsed.as_ms() / MS_PER_MINUTE)
    }
}

impl Serialize for DayBoundary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DayBoundary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Target working time per weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklySchedule {
    pub monday: WorkDuration,
    pub tuesday: WorkDuration,
    pub wednesday: WorkDuration,
    pub thursday: WorkDuration,
    pub friday: WorkDuration,
    pub saturday: WorkDuration,
    pub sunday: WorkDuration,
}

impl WeeklySchedule {
    /// Same target Monday to Friday, nothing on weekends.
    #[must_use]
    pub const fn weekdays(target: WorkDuration) -> Self {
        Self {
            monday: target,
            tuesday: target,
            wednesday: target,
            thursday: target,
            friday: target,
            saturday: WorkDuration(0),
            sunday: WorkDuration(0),
        }
    }

    /// Scheduled target for the given date, before absence credits.
    #[must_use]
    pub fn target_for(&self, date: NaiveDate) -> WorkDuration {
        match date.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self::weekdays(WorkDuration::from_minutes(8 * 60))
    }
}

/// Thresholds for the built-in rules. `None` disables a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Longest allowed single session without a break.
    pub max_continuous_work: Option<WorkDuration>,
    /// Shortest allowed rest between two working days.
    pub min_rest: Option<WorkDuration>,
    /// Shortest allowed break between consecutive sessions of one day.
    /// Default: unset.
    pub min_break: Option<WorkDuration>,
    /// Lowest acceptable yearly closing balance.
    pub balance_floor: Option<WorkDuration>,
    /// Highest acceptable yearly closing balance.
    pub balance_ceiling: Option<WorkDuration>,
    /// Most clock events accepted on one day.
    pub max_events_per_day: Option<u32>,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            max_continuous_work: Some(WorkDuration::from_minutes(5 * 60 + 30)),
            min_rest: Some(WorkDuration::from_minutes(11 * 60)),
            min_break: None,
            balance_floor: None,
            balance_ceiling: None,
            max_events_per_day: Some(10),
        }
    }
}

/// Everything the engine needs to know about one employee besides the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeProfile {
    /// Weekly target hours.
    pub schedule: WeeklySchedule,
    /// Where one working day ends and the next begins.
    pub day_boundary: DayBoundary,
    /// Rule thresholds.
    pub rules: RuleThresholds,
    /// Vacation allowance per calendar year, in days.
    pub vacation_days_per_year: u16,
    /// Close a forgotten open session after this long. Kept open when unset.
    pub auto_close_after: Option<WorkDuration>,
    /// Scans closer than this to the previous one are reported as debounced.
    /// Default: 3000 (3 seconds).
    pub debounce_ms: i64,
}

impl Default for EmployeeProfile {
    fn default() -> Self {
        Self {
            schedule: WeeklySchedule::default(),
            day_boundary: DayBoundary::MIDNIGHT,
            rules: RuleThresholds::default(),
            vacation_days_per_year: 25,
            auto_close_after: None,
            debounce_ms: 3_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn format_hm_handles_sign_and_padding() {
        assert_eq!(format_hm(0), "0:00");
        assert_eq!(format_hm(40 * 60_000), "0:40");
        assert_eq!(format_hm(-(8 * 60 + 5) * 60_000), "-8:05");
        assert_eq!(format_hm(100 * 60 * 60_000), "100:00");
    }

    #[test]
    fn work_duration_parses_signed_values() {
        assert_eq!(
            "8:24".parse::<WorkDuration>().unwrap(),
            WorkDuration::from_minutes(504)
        );
        assert_eq!(
            "-20:00".parse::<WorkDuration>().unwrap(),
            WorkDuration::from_minutes(-1200)
        );
        assert!("8:60".parse::<WorkDuration>().is_err());
        assert!("eight".parse::<WorkDuration>().is_err());
    }

    #[test]
    fn day_boundary_at_midnight_uses_calendar_date() {
        let boundary = DayBoundary::MIDNIGHT;
        assert_eq!(
            boundary.day_of(&ts("2025-03-04T00:20:00+01:00")),
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
        );
    }

    #[test]
    fn shifted_day_boundary_attributes_early_hours_to_previous_day() {
        let boundary: DayBoundary = "04:00".parse().unwrap();
        assert_eq!(
            boundary.day_of(&ts("2025-03-04T02:30:00+01:00")),
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );
        assert_eq!(
            boundary.day_of(&ts("2025-03-04T04:00:00+01:00")),
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
        );
        assert_eq!(boundary.to_string(), "04:00");
    }

    #[test]
    fn working_day_starts_at_the_boundary() {
        let boundary: DayBoundary = "04:00".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(boundary.start_of(day).to_string(), "2025-03-03 04:00:00");
        assert_eq!(DayBoundary::MIDNIGHT.start_of(day).to_string(), "2025-03-03 00:00:00");
    }

    #[test]
    fn day_boundary_rejects_out_of_range() {
        assert!(DayBoundary::from_minutes(24 * 60).is_err());
        assert!("-1:00".parse::<DayBoundary>().is_err());
    }

    #[test]
    fn default_schedule_has_free_weekends() {
        let schedule = WeeklySchedule::default();
        let saturday = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(schedule.target_for(saturday).as_ms(), 0);
        assert_eq!(schedule.target_for(monday), WorkDuration::from_minutes(480));
    }

    #[test]
    fn profile_deserializes_partial_json() {
        let json = r#"{"day_boundary": "05:30", "rules": {"balance_floor": "-10:00"}}"#;
        let profile: EmployeeProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.day_boundary.minutes(), 330);
        assert_eq!(
            profile.rules.balance_floor,
            Some(WorkDuration::from_minutes(-600))
        );
        assert_eq!(profile.rules.min_rest, RuleThresholds::default().min_rest);
        assert_eq!(profile.rules.min_break, None);
        assert_eq!(profile.schedule, WeeklySchedule::default());
    }
}
