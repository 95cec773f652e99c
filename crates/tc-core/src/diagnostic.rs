//! Recorded, non-fatal findings about attendance data.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::ledger::PeriodId;

/// How much a diagnostic matters for closing a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// Prevents the owning period from being finalized.
    Blocking,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Blocking => "blocking",
        };
        f.write_str(s)
    }
}

/// What was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// A clock-in without a matching clock-out.
    MissingClockOut,
    /// An explicit clock-out while no session was open.
    MissingClockIn,
    /// A session starting before the previous one ended.
    OverlappingSession,
    /// A session crossing more than one day boundary.
    AmbiguousSpan,
    /// A business rule was violated.
    RuleViolation { rule: String },
    /// A concurrent write was detected and the cycle re-run.
    StaleConflict,
    /// An abandoned lease was forcibly reclaimed.
    LeaseReclaimed,
}

impl DiagnosticKind {
    /// Short label used in listings.
    pub fn label(&self) -> String {
        match self {
            Self::MissingClockOut => "missing-clock-out".to_string(),
            Self::MissingClockIn => "missing-clock-in".to_string(),
            Self::OverlappingSession => "overlapping-session".to_string(),
            Self::AmbiguousSpan => "ambiguous-span".to_string(),
            Self::RuleViolation { rule } => format!("rule-violation:{rule}"),
            Self::StaleConflict => "stale-conflict".to_string(),
            Self::LeaseReclaimed => "lease-reclaimed".to_string(),
        }
    }
}

/// What a diagnostic is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "ref", rename_all = "lowercase")]
pub enum DiagnosticScope {
    Day(NaiveDate),
    Period(PeriodId),
    Ledger,
}

/// A recorded finding about attendance data or about the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(flatten)]
    pub scope: DiagnosticScope,
    /// Instant of the triggering observation, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<FixedOffset>>,
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic attached to a day.
    pub fn day(
        kind: DiagnosticKind,
        severity: Severity,
        day: NaiveDate,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            scope: DiagnosticScope::Day(day),
            at: None,
            message: message.into(),
        }
    }

    /// Creates a diagnostic attached to a period.
    pub fn period(
        kind: DiagnosticKind,
        severity: Severity,
        period: PeriodId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            scope: DiagnosticScope::Period(period),
            at: None,
            message: message.into(),
        }
    }

    /// Creates a ledger-wide diagnostic, used for store anomalies.
    pub fn ledger(
        kind: DiagnosticKind,
        severity: Severity,
        at: DateTime<FixedOffset>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            scope: DiagnosticScope::Ledger,
            at: Some(at),
            message: message.into(),
        }
    }

    /// Attaches the triggering instant.
    #[must_use]
    pub const fn at(mut self, at: DateTime<FixedOffset>) -> Self {
        self.at = Some(at);
        self
    }

    /// Whether this diagnostic keeps its period provisional.
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }

    /// Whether the diagnostic refers to a date within `[from, to]`.
    ///
    /// Ledger-wide diagnostics are matched by the date of their instant and
    /// periods by overlap with the range.
    pub fn touches(&self, from: NaiveDate, to: NaiveDate) -> bool {
        match &self.scope {
            DiagnosticScope::Day(day) => (from..=to).contains(day),
            DiagnosticScope::Period(period) => period.first_day() <= to && period.last_day() >= from,
            DiagnosticScope::Ledger => self
                .at
                .is_some_and(|at| (from..=to).contains(&at.date_naive())),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match &self.scope {
            DiagnosticScope::Day(day) => day.to_string(),
            DiagnosticScope::Period(period) => period.to_string(),
            DiagnosticScope::Ledger => "ledger".to_string(),
        };
        write!(
            f,
            "[{}] {} {}: {}",
            self.severity,
            scope,
            self.kind.label(),
            self.message
        )
    }
}

/// Most severe level among the given diagnostics.
pub fn worst_severity<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> Option<Severity> {
    diagnostics.into_iter().map(|d| d.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn diagnostic_serializes_flat() {
        let diag = Diagnostic::day(
            DiagnosticKind::RuleViolation {
                rule: "max-continuous-work".to_string(),
            },
            Severity::Warning,
            date(2025, 3, 3),
            "worked 6:10 without a break",
        );
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "rule-violation");
        assert_eq!(json["rule"], "max-continuous-work");
        assert_eq!(json["scope"], "day");
        assert_eq!(json["ref"], "2025-03-03");
        assert_eq!(json["severity"], "warning");

        let parsed: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, diag);
    }

    #[test]
    fn touches_matches_day_period_and_ledger_scopes() {
        let day = Diagnostic::day(
            DiagnosticKind::MissingClockOut,
            Severity::Blocking,
            date(2025, 3, 3),
            "x",
        );
        assert!(day.touches(date(2025, 3, 1), date(2025, 3, 31)));
        assert!(!day.touches(date(2025, 3, 4), date(2025, 3, 31)));

        let period = Diagnostic::period(
            DiagnosticKind::RuleViolation {
                rule: "balance-floor".to_string(),
            },
            Severity::Warning,
            PeriodId::Year(2025),
            "x",
        );
        assert!(period.touches(date(2025, 12, 31), date(2026, 1, 5)));
        assert!(!period.touches(date(2026, 1, 1), date(2026, 1, 5)));

        let at = DateTime::parse_from_rfc3339("2025-03-03T10:00:00+01:00").unwrap();
        let ledger = Diagnostic::ledger(DiagnosticKind::LeaseReclaimed, Severity::Warning, at, "x");
        assert!(ledger.touches(date(2025, 3, 3), date(2025, 3, 3)));
        assert!(!ledger.touches(date(2025, 3, 4), date(2025, 3, 5)));
    }

    #[test]
    fn display_lists_severity_scope_and_label() {
        let diag = Diagnostic::period(
            DiagnosticKind::RuleViolation {
                rule: "balance-floor".to_string(),
            },
            Severity::Warning,
            PeriodId::Year(2025),
            "balance -12:00 is below the floor of -10:00",
        );
        insta::assert_snapshot!(diag, @"[warning] 2025 rule-violation:balance-floor: balance -12:00 is below the floor of -10:00");
    }

    #[test]
    fn worst_severity_picks_maximum() {
        let d = |severity| Diagnostic::day(DiagnosticKind::AmbiguousSpan, severity, date(2025, 1, 1), "x");
        let diags = [d(Severity::Info), d(Severity::Blocking), d(Severity::Warning)];
        assert_eq!(worst_severity(&diags), Some(Severity::Blocking));
        let none: [Diagnostic; 0] = [];
        assert_eq!(worst_severity(&none), None);
    }
}
