//! Event normalization.
//!
//! Turns an employee's raw scans into an alternating sequence of clock-in
//! and clock-out boundaries, each attributed to a working day.
//!
//! # Rules
//!
//! 1. Events are ordered by instant (stable, so same-instant scans keep their
//!    recorded order). Events after the evaluation instant are ignored.
//! 2. A scan without an explicit direction toggles: it opens a session when
//!    none is open and closes the open one otherwise.
//! 3. A clock-out is attributed to the day its session opened, so an
//!    overnight shift stays one session (rollover).
//! 4. A clock-in while a session is open closes that session at its own
//!    start instant and records `missing-clock-out`. Both scans are kept.
//! 5. A clock-out with no open session records `missing-clock-in`.
//! 6. A session whose clock-out falls two or more working days after its
//!    clock-in records `ambiguous-span`.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::event::{ClockAction, ScanEvent};
use crate::profile::DayBoundary;

/// A clock-in or clock-out attributed to a working day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Working day of the session this boundary belongs to.
    pub day: NaiveDate,
    pub action: ClockAction,
    pub at: DateTime<FixedOffset>,
    /// Inserted by normalization instead of scanned.
    pub implicit: bool,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Alternating boundaries, starting with a clock-in.
    pub boundaries: Vec<Boundary>,
    /// Scans attributed to each working day.
    pub event_counts: BTreeMap<NaiveDate, u32>,
    /// Structural findings.
    pub diagnostics: Vec<Diagnostic>,
}

/// Normalizes scans into day-attributed session boundaries.
pub fn normalize(
    events: &[ScanEvent],
    day_boundary: DayBoundary,
    as_of: DateTime<FixedOffset>,
) -> Normalized {
    let mut ordered: Vec<&ScanEvent> = events.iter().filter(|e| e.timestamp <= as_of).collect();
    ordered.sort_by_key(|e| e.timestamp);

    let mut out = Normalized::default();
    let mut open: Option<(NaiveDate, DateTime<FixedOffset>)> = None;

    for event in ordered {
        let natural_day = day_boundary.day_of(&event.timestamp);
        let action = event.kind.unwrap_or(if open.is_some() {
            ClockAction::Out
        } else {
            ClockAction::In
        });

        match (action, open) {
            (ClockAction::In, previous) => {
                if let Some((day, start)) = previous {
                    out.boundaries.push(Boundary {
                        day,
                        action: ClockAction::Out,
                        at: start,
                        implicit: true,
                    });
                    out.diagnostics.push(
                        Diagnostic::day(
                            DiagnosticKind::MissingClockOut,
                            Severity::Blocking,
                            day,
                            format!(
                                "clock-in at {} has no clock-out before the next clock-in at {}",
                                start.format("%Y-%m-%d %H:%M"),
                                event.timestamp.format("%Y-%m-%d %H:%M"),
                            ),
                        )
                        .at(start),
                    );
                }
                out.boundaries.push(Boundary {
                    day: natural_day,
                    action: ClockAction::In,
                    at: event.timestamp,
                    implicit: false,
                });
                *out.event_counts.entry(natural_day).or_default() += 1;
                open = Some((natural_day, event.timestamp));
            }
            (ClockAction::Out, Some((day, start))) => {
                let days_later = (natural_day - day).num_days();
                if days_later > 1 {
                    out.diagnostics.push(
                        Diagnostic::day(
                            DiagnosticKind::AmbiguousSpan,
                            Severity::Blocking,
                            day,
                            format!(
                                "session from {} to {} crosses {days_later} day boundaries",
                                start.format("%Y-%m-%d %H:%M"),
                                event.timestamp.format("%Y-%m-%d %H:%M"),
                            ),
                        )
                        .at(event.timestamp),
                    );
                }
                out.boundaries.push(Boundary {
                    day,
                    action: ClockAction::Out,
                    at: event.timestamp,
                    implicit: false,
                });
                *out.event_counts.entry(day).or_default() += 1;
                open = None;
            }
            (ClockAction::Out, None) => {
                out.diagnostics.push(
                    Diagnostic::day(
                        DiagnosticKind::MissingClockIn,
                        Severity::Blocking,
                        natural_day,
                        format!(
                            "clock-out at {} without an open session",
                            event.timestamp.format("%Y-%m-%d %H:%M"),
                        ),
                    )
                    .at(event.timestamp),
                );
                *out.event_counts.entry(natural_day).or_default() += 1;
            }
        }
    }

    tracing::trace!(
        boundaries = out.boundaries.len(),
        diagnostics = out.diagnostics.len(),
        "normalized scan events"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmployeeId;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scan(s: &str) -> ScanEvent {
        ScanEvent::new(EmployeeId::new("042").unwrap(), ts(s))
    }

    fn far_future() -> DateTime<FixedOffset> {
        ts("2100-01-01T00:00:00Z")
    }

    #[test]
    fn alternation_infers_direction() {
        let events = [
            scan("2025-03-03T08:00:00+01:00"),
            scan("2025-03-03T12:00:00+01:00"),
            scan("2025-03-03T13:00:00+01:00"),
            scan("2025-03-03T17:00:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        let actions: Vec<_> = n.boundaries.iter().map(|b| b.action).collect();
        assert_eq!(
            actions,
            [ClockAction::In, ClockAction::Out, ClockAction::In, ClockAction::Out]
        );
        assert!(n.diagnostics.is_empty());
        assert_eq!(n.event_counts[&date(2025, 3, 3)], 4);
    }

    #[test]
    fn clock_out_after_midnight_belongs_to_opening_day() {
        let events = [
            scan("2025-03-03T23:40:00+01:00"),
            scan("2025-03-04T00:20:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        assert!(n.boundaries.iter().all(|b| b.day == date(2025, 3, 3)));
        assert!(n.diagnostics.is_empty());
    }

    #[test]
    fn unsorted_input_is_ordered() {
        let events = [
            scan("2025-03-03T17:00:00+01:00"),
            scan("2025-03-03T08:00:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        assert_eq!(n.boundaries[0].at, ts("2025-03-03T08:00:00+01:00"));
        assert_eq!(n.boundaries[0].action, ClockAction::In);
    }

    #[test]
    fn double_clock_in_inserts_implicit_clock_out() {
        let events = [
            scan("2025-03-03T08:00:00+01:00").with_kind(ClockAction::In),
            scan("2025-03-03T09:00:00+01:00").with_kind(ClockAction::In),
            scan("2025-03-03T17:00:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        assert_eq!(n.boundaries.len(), 4);
        assert!(n.boundaries[1].implicit);
        assert_eq!(n.boundaries[1].at, ts("2025-03-03T08:00:00+01:00"));
        assert_eq!(n.diagnostics.len(), 1);
        assert_eq!(n.diagnostics[0].kind, DiagnosticKind::MissingClockOut);
        assert_eq!(n.event_counts[&date(2025, 3, 3)], 3);
    }

    #[test]
    fn explicit_clock_out_without_session_is_flagged() {
        let events = [scan("2025-03-03T17:00:00+01:00").with_kind(ClockAction::Out)];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        assert!(n.boundaries.is_empty());
        assert_eq!(n.diagnostics[0].kind, DiagnosticKind::MissingClockIn);
        assert!(n.diagnostics[0].is_blocking());
    }

    #[test]
    fn multi_day_session_is_ambiguous() {
        let events = [
            scan("2025-03-03T08:00:00+01:00"),
            scan("2025-03-05T09:00:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, far_future());
        assert_eq!(n.diagnostics.len(), 1);
        assert_eq!(n.diagnostics[0].kind, DiagnosticKind::AmbiguousSpan);
        assert!(n.boundaries.iter().all(|b| b.day == date(2025, 3, 3)));
    }

    #[test]
    fn events_after_evaluation_instant_are_ignored() {
        let events = [
            scan("2025-03-03T08:00:00+01:00"),
            scan("2025-03-03T17:00:00+01:00"),
        ];
        let n = normalize(&events, DayBoundary::MIDNIGHT, ts("2025-03-03T12:00:00+01:00"));
        assert_eq!(n.boundaries.len(), 1);
        assert_eq!(n.event_counts[&date(2025, 3, 3)], 1);
    }

    #[test]
    fn shifted_boundary_attributes_night_scans_to_previous_day() {
        let boundary: DayBoundary = "04:00".parse().unwrap();
        let events = [
            scan("2025-03-04T02:00:00+01:00"),
            scan("2025-03-04T03:00:00+01:00"),
        ];
        let n = normalize(&events, boundary, far_future());
        assert!(n.boundaries.iter().all(|b| b.day == date(2025, 3, 3)));
    }
}
