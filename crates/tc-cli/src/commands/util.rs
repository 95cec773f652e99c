//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use tc_core::{DayBoundary, ManualSession};

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Pre-compiled regex for `HH:MM-HH:MM` session ranges.
static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string relative to `now`.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00+01:00"
/// - Wall-clock time today, in `now`'s offset: "08:15"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<FixedOffset>) -> anyhow::Result<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }

    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        return resolve(now.offset(), now.date_naive().and_time(time));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00+01:00), a time of day (e.g., 08:15) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Parse an `HH:MM-HH:MM` range on the working day `day`.
///
/// Times before the day boundary belong to the next calendar date, and so
/// does an end before the start. Each instant takes its UTC offset from
/// `zone` on its own date.
pub fn parse_session<Tz: TimeZone>(
    s: &str,
    day: NaiveDate,
    boundary: DayBoundary,
    zone: &Tz,
) -> anyhow::Result<ManualSession> {
    let Some(caps) = SESSION_RE.captures(s.trim()) else {
        anyhow::bail!("Invalid session: {s}. Use HH:MM-HH:MM (e.g., 08:00-12:30)");
    };
    let parse = |t: &str| {
        NaiveTime::parse_from_str(t, "%H:%M").with_context(|| format!("invalid time of day: {t}"))
    };
    let (start_time, end_time) = (parse(&caps[1])?, parse(&caps[2])?);

    let mut start = day.and_time(start_time);
    if start < boundary.start_of(day) {
        start += Duration::days(1);
    }
    let mut end = start.date().and_time(end_time);
    if end < start {
        end += Duration::days(1);
    }
    let session = ManualSession::new(resolve(zone, start)?, resolve(zone, end)?)?;
    Ok(session)
}

fn resolve<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> anyhow::Result<DateTime<FixedOffset>> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .with_context(|| format!("{local} does not exist in the time zone"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2025-03-03T12:00:00+01:00").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_rfc3339_keeps_offset() {
        let dt = parse_datetime("2025-03-03T08:00:00+02:00", now()).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_parse_time_of_day_uses_today() {
        let dt = parse_datetime("08:15", now()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-03T08:15:00+01:00");
    }

    #[test]
    fn test_parse_relative() {
        let dt = parse_datetime("90 minutes ago", now()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-03T10:30:00+01:00");
        assert!(parse_datetime("2 days ago", now()).is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datetime("yesterday-ish", now()).is_err());
        assert!(parse_datetime("999999999 weeks ago", now()).is_err());
    }

    #[test]
    fn test_parse_session_range() {
        let session = parse_session("08:00-12:30", date(2025, 3, 3), DayBoundary::MIDNIGHT, now().offset()).unwrap();
        assert_eq!(session.start.to_rfc3339(), "2025-03-03T08:00:00+01:00");
        assert_eq!(session.end.to_rfc3339(), "2025-03-03T12:30:00+01:00");
    }

    #[test]
    fn test_parse_session_past_midnight() {
        let session = parse_session("22:00 - 02:00", date(2025, 3, 3), DayBoundary::MIDNIGHT, now().offset()).unwrap();
        assert_eq!(session.end.to_rfc3339(), "2025-03-04T02:00:00+01:00");
    }

    #[test]
    fn test_parse_session_before_boundary_is_next_morning() {
        let boundary: DayBoundary = "04:00".parse().unwrap();
        let session = parse_session("02:00-03:00", date(2025, 3, 3), boundary, now().offset()).unwrap();
        assert_eq!(session.start.to_rfc3339(), "2025-03-04T02:00:00+01:00");
        assert_eq!(session.end.to_rfc3339(), "2025-03-04T03:00:00+01:00");
        assert_eq!(boundary.day_of(&session.start), date(2025, 3, 3));
    }

    #[test]
    fn test_parse_session_offset_follows_the_zone() {
        let zone = FixedOffset::west_opt(5 * 3600).unwrap();
        let session = parse_session("09:00-10:00", date(2025, 7, 1), DayBoundary::MIDNIGHT, &zone).unwrap();
        assert_eq!(session.start.to_rfc3339(), "2025-07-01T09:00:00-05:00");
    }

    #[test]
    fn test_parse_session_rejects_empty_and_malformed() {
        let offset = now().offset().to_owned();
        assert!(parse_session("08:00-08:00", date(2025, 3, 3), DayBoundary::MIDNIGHT, &offset).is_err());
        assert!(parse_session("8-12", date(2025, 3, 3), DayBoundary::MIDNIGHT, &offset).is_err());
    }
}
