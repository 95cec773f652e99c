//! Session reconciliation.
//!
//! Pairs normalized boundaries into [`WorkSession`]s, merges manual sessions
//! from day amendments and flags overlaps. Sessions are never shortened,
//! merged or dropped here: every observation survives for human review.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::event::ClockAction;
use crate::ledger::{DayAmendment, SessionOrigin, WorkSession};
use crate::normalize::Boundary;
use crate::profile::{DayBoundary, WorkDuration};

/// Settings for turning boundaries into sessions.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    pub day_boundary: DayBoundary,
    /// Close a trailing open session after this long.
    pub auto_close_after: Option<WorkDuration>,
    /// Instant open sessions are measured up to.
    pub as_of: DateTime<FixedOffset>,
}

/// Sessions grouped by working day, with structural findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub sessions: BTreeMap<NaiveDate, Vec<WorkSession>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Pairs boundaries into sessions and merges manual sessions.
pub fn reconcile(
    boundaries: &[Boundary],
    amendments: &BTreeMap<NaiveDate, DayAmendment>,
    config: &ReconcileConfig,
) -> Reconciled {
    let mut out = Reconciled::default();
    let mut pending: Option<&Boundary> = None;

    for boundary in boundaries {
        match boundary.action {
            ClockAction::In => pending = Some(boundary),
            ClockAction::Out => {
                if let Some(start) = pending.take() {
                    let session = closed_session(
                        start.day,
                        start.at,
                        boundary.at,
                        SessionOrigin::Scanned,
                        config.day_boundary,
                    );
                    out.sessions.entry(start.day).or_default().push(session);
                }
            }
        }
    }

    if let Some(start) = pending {
        let (session, diagnostic) = trailing_session(start, config);
        out.sessions.entry(start.day).or_default().push(session);
        out.diagnostics.push(diagnostic);
    }

    for (date, amendment) in amendments {
        for manual in &amendment.manual_sessions {
            let session = closed_session(
                *date,
                manual.start,
                manual.end,
                SessionOrigin::Manual,
                config.day_boundary,
            );
            out.sessions.entry(*date).or_default().push(session);
        }
    }

    for sessions in out.sessions.values_mut() {
        sessions.sort_by_key(|s| s.start);
    }
    out.diagnostics.extend(find_overlaps(&out.sessions, config.as_of));
    out
}

fn closed_session(
    day: NaiveDate,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    origin: SessionOrigin,
    day_boundary: DayBoundary,
) -> WorkSession {
    WorkSession {
        day,
        start,
        end: Some(end),
        duration_ms: (end - start).num_milliseconds(),
        rollover: day_boundary.day_of(&end) > day,
        auto_closed: false,
        origin,
    }
}

/// Builds the session for a clock-in that has no clock-out yet.
fn trailing_session(start: &Boundary, config: &ReconcileConfig) -> (WorkSession, Diagnostic) {
    let auto_end = config
        .auto_close_after
        .map(|limit| start.at + limit.to_duration())
        .filter(|end| *end <= config.as_of);

    let (session, message) = if let Some(end) = auto_end {
        let mut session = closed_session(
            start.day,
            start.at,
            end,
            SessionOrigin::Scanned,
            config.day_boundary,
        );
        session.auto_closed = true;
        let message = format!(
            "clock-in at {} has no clock-out; closed automatically at {}",
            start.at.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M"),
        );
        (session, message)
    } else {
        let session = WorkSession {
            day: start.day,
            start: start.at,
            end: None,
            duration_ms: (config.as_of - start.at).num_milliseconds().max(0),
            rollover: config.day_boundary.day_of(&config.as_of) > start.day,
            auto_closed: false,
            origin: SessionOrigin::Scanned,
        };
        let message = format!(
            "clock-in at {} has no clock-out yet",
            start.at.format("%Y-%m-%d %H:%M"),
        );
        (session, message)
    };

    let diagnostic = Diagnostic::day(
        DiagnosticKind::MissingClockOut,
        Severity::Blocking,
        start.day,
        message,
    )
    .at(start.at);
    (session, diagnostic)
}

/// Flags every session that starts before an earlier session ends.
///
/// Sessions are compared across days so an overnight shift colliding with a
/// manual entry on the next day is caught too. The diagnostic goes to the day
/// of the later session.
fn find_overlaps(
    sessions: &BTreeMap<NaiveDate, Vec<WorkSession>>,
    as_of: DateTime<FixedOffset>,
) -> Vec<Diagnostic> {
    let mut all: Vec<&WorkSession> = sessions.values().flatten().collect();
    all.sort_by_key(|s| s.start);

    let mut diagnostics = Vec::new();
    let mut latest: Option<(DateTime<FixedOffset>, &WorkSession)> = None;
    for session in all {
        let end = session.end.unwrap_or(as_of);
        if let Some((previous_end, previous)) = latest {
            if session.start < previous_end {
                diagnostics.push(
                    Diagnostic::day(
                        DiagnosticKind::OverlappingSession,
                        Severity::Blocking,
                        session.day,
                        format!(
                            "session starting {} overlaps the session starting {}",
                            session.start.format("%Y-%m-%d %H:%M"),
                            previous.start.format("%Y-%m-%d %H:%M"),
                        ),
                    )
                    .at(session.start),
                );
            }
            if end <= previous_end {
                continue;
            }
        }
        latest = Some((end, session));
    }
    diagnostics
}
