//! Full ledger evaluation: normalize, reconcile, aggregate, validate.
//!
//! [`evaluate`] rebuilds every derived section of a ledger (days, balances
//! and their diagnostics) from the events and amendments alone. Running it
//! twice with the same inputs yields identical output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

use crate::aggregate::{self, RollUp};
use crate::diagnostic::{Diagnostic, DiagnosticScope};
use crate::ledger::{DayRecord, EmployeeLedger, FORMAT_VERSION};
use crate::normalize::normalize;
use crate::profile::EmployeeProfile;
use crate::reconcile::{ReconcileConfig, reconcile};
use crate::rules::{RuleContext, RuleSet};

/// Errors that abort an evaluation. Nothing is written to the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("evaluation was cancelled")]
    Cancelled,

    #[error("invalid employee profile: {reason}")]
    InvalidProfile { reason: String },

    #[error("unsupported ledger format version {found} (expected {FORMAT_VERSION})")]
    UnsupportedFormat { found: u32 },
}

/// Shared cancellation request, checked between day units.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every evaluation sharing this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

fn validate_profile(profile: &EmployeeProfile) -> Result<(), EngineError> {
    if profile.debounce_ms < 0 {
        return Err(EngineError::InvalidProfile {
            reason: format!("debounce_ms must not be negative, got {}", profile.debounce_ms),
        });
    }
    if let Some(limit) = profile.auto_close_after.filter(|l| l.as_ms() <= 0) {
        return Err(EngineError::InvalidProfile {
            reason: format!("auto_close_after must be positive, got {limit}"),
        });
    }
    Ok(())
}

/// Re-derives the ledger at `as_of` with the profile's built-in rules.
pub fn evaluate(
    ledger: &mut EmployeeLedger,
    profile: &EmployeeProfile,
    as_of: DateTime<FixedOffset>,
    cancel: &CancelFlag,
) -> Result<(), EngineError> {
    let rules = RuleSet::from_thresholds(&profile.rules);
    evaluate_with(ledger, profile, &rules, as_of, cancel)
}

/// Re-derives the ledger at `as_of` with an explicit rule set.
///
/// On error the ledger is left untouched.
pub fn evaluate_with(
    ledger: &mut EmployeeLedger,
    profile: &EmployeeProfile,
    rules: &RuleSet,
    as_of: DateTime<FixedOffset>,
    cancel: &CancelFlag,
) -> Result<(), EngineError> {
    if ledger.format_version != FORMAT_VERSION {
        return Err(EngineError::UnsupportedFormat {
            found: ledger.format_version,
        });
    }
    validate_profile(profile)?;

    let as_of_day = profile.day_boundary.day_of(&as_of);
    let normalized = normalize(&ledger.events, profile.day_boundary, as_of);
    let mut reconciled = reconcile(
        &normalized.boundaries,
        &ledger.amendments,
        &ReconcileConfig {
            day_boundary: profile.day_boundary,
            auto_close_after: profile.auto_close_after,
            as_of,
        },
    );

    let mut structural = normalized.diagnostics;
    structural.append(&mut reconciled.diagnostics);

    let data_days = reconciled
        .sessions
        .keys()
        .chain(normalized.event_counts.keys())
        .chain(ledger.amendments.keys())
        .copied()
        .chain(structural.iter().filter_map(|d| match d.scope {
            DiagnosticScope::Day(day) => Some(day),
            _ => None,
        }))
        .collect::<Vec<NaiveDate>>();
    let dates =
        aggregate::days_to_materialize(ledger.started_on, as_of_day, &profile.schedule, data_days);

    let mut days: Vec<DayRecord> = Vec::with_capacity(dates.len());
    for date in dates {
        cancel.check()?;
        let sessions = reconciled.sessions.remove(&date).unwrap_or_default();
        let event_count = normalized.event_counts.get(&date).copied().unwrap_or(0);
        let mut day = aggregate::day_record(
            date,
            sessions,
            event_count,
            ledger.amendments.get(&date),
            profile,
            as_of_day,
        );
        day.diagnostics = structural
            .iter()
            .filter(|d| d.scope == DiagnosticScope::Day(date))
            .cloned()
            .collect();
        days.push(day);
    }

    apply_day_rules(&mut days, rules, cancel)?;

    let mut balances = aggregate::roll_up(
        &days,
        &RollUp {
            started_on: ledger.started_on,
            opening_balance_ms: ledger.opening_balance_ms,
            as_of_day,
            profile,
            amendments: &ledger.amendments,
        },
    );
    for balance in &mut balances {
        cancel.check()?;
        let found = rules.evaluate(&RuleContext::Period(balance));
        union_into(&mut balance.diagnostics, found);
    }

    tracing::debug!(
        employee_id = %ledger.employee_id,
        day_count = days.len(),
        period_count = balances.len(),
        %as_of,
        "evaluated ledger"
    );

    ledger.days = days;
    ledger.balances = balances;
    ledger.evaluated_at = Some(as_of);
    Ok(())
}

/// Runs the day rules; `previous` is the closest earlier day with sessions.
fn apply_day_rules(
    days: &mut [DayRecord],
    rules: &RuleSet,
    cancel: &CancelFlag,
) -> Result<(), EngineError> {
    let mut previous: Option<usize> = None;
    for i in 0..days.len() {
        cancel.check()?;
        let found = rules.evaluate(&RuleContext::Day {
            day: &days[i],
            previous: previous.map(|p| &days[p]),
        });
        union_into(&mut days[i].diagnostics, found);
        if !days[i].sessions.is_empty() {
            previous = Some(i);
        }
    }
    Ok(())
}

/// Adds diagnostics that are not already present.
fn union_into(target: &mut Vec<Diagnostic>, found: Vec<Diagnostic>) {
    for diagnostic in found {
        if !target.contains(&diagnostic) {
            target.push(diagnostic);
        }
    }
}
