//! Business rules evaluated over reconciled days and balances.
//!
//! Each rule is a pure predicate object. Rules never change numbers; a
//! violation only adds a `rule-violation` diagnostic.

use chrono::Duration;

use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::ledger::{DayRecord, PeriodBalance, PeriodId};
use crate::profile::{RuleThresholds, WorkDuration, format_hm};

/// What a rule looks at.
#[derive(Debug, Clone, Copy)]
pub enum RuleContext<'a> {
    /// A working day and the closest earlier day with worked time.
    Day {
        day: &'a DayRecord,
        previous: Option<&'a DayRecord>,
    },
    /// A month or year balance.
    Period(&'a PeriodBalance),
}

/// A single business rule.
pub trait Rule: Send + Sync {
    /// Stable name, used as the diagnostic's rule reference.
    fn name(&self) -> &'static str;

    /// Returns a diagnostic when the context violates the rule.
    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic>;
}

fn day_violation(rule: &dyn Rule, day: &DayRecord, message: String) -> Diagnostic {
    Diagnostic::day(
        DiagnosticKind::RuleViolation {
            rule: rule.name().to_string(),
        },
        Severity::Warning,
        day.date,
        message,
    )
}

fn period_violation(rule: &dyn Rule, period: PeriodId, message: String) -> Diagnostic {
    Diagnostic::period(
        DiagnosticKind::RuleViolation {
            rule: rule.name().to_string(),
        },
        Severity::Warning,
        period,
        message,
    )
}

/// No single session may exceed the limit.
#[derive(Debug, Clone, Copy)]
pub struct MaxContinuousWork {
    pub limit: WorkDuration,
}

impl Rule for MaxContinuousWork {
    fn name(&self) -> &'static str {
        "max-continuous-work"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Day { day, .. } = context else {
            return None;
        };
        let longest = day.sessions.iter().max_by_key(|s| s.duration_ms)?;
        (longest.duration_ms > self.limit.as_ms()).then(|| {
            day_violation(
                self,
                day,
                format!(
                    "worked {} without a break (limit {})",
                    format_hm(longest.duration_ms),
                    self.limit
                ),
            )
            .at(longest.start)
        })
    }
}

/// Rest between the end of one working day and the start of the next.
#[derive(Debug, Clone, Copy)]
pub struct MinimumRest {
    pub minimum: WorkDuration,
}

impl Rule for MinimumRest {
    fn name(&self) -> &'static str {
        "minimum-rest"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Day {
            day,
            previous: Some(previous),
        } = context
        else {
            return None;
        };
        let first_start = day.sessions.iter().map(|s| s.start).min()?;
        let last_end = previous
            .sessions
            .iter()
            .map(|s| s.start + Duration::milliseconds(s.duration_ms))
            .max()?;
        let rest_ms = (first_start - last_end).num_milliseconds();
        (rest_ms < self.minimum.as_ms()).then(|| {
            day_violation(
                self,
                day,
                format!(
                    "only {} rest since {} (minimum {})",
                    format_hm(rest_ms),
                    previous.date,
                    self.minimum
                ),
            )
            .at(first_start)
        })
    }
}

/// Rest between consecutive sessions of the same working day.
///
/// Zero-length sessions (implicit clock-outs) and overlapping sessions are
/// left to the structural diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct MinimumBreak {
    pub minimum: WorkDuration,
}

impl Rule for MinimumBreak {
    fn name(&self) -> &'static str {
        "minimum-break"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Day { day, .. } = context else {
            return None;
        };
        let mut sessions: Vec<_> = day.sessions.iter().filter(|s| s.duration_ms > 0).collect();
        sessions.sort_by_key(|s| s.start);
        sessions.windows(2).find_map(|pair| {
            let end = pair[0].end?;
            let next = pair[1].start;
            let break_ms = (next - end).num_milliseconds();
            (0..self.minimum.as_ms()).contains(&break_ms).then(|| {
                day_violation(
                    self,
                    day,
                    format!(
                        "only {} break before {} (minimum {})",
                        format_hm(break_ms),
                        next.format("%H:%M"),
                        self.minimum
                    ),
                )
                .at(next)
            })
        })
    }
}

/// Yearly closing balance must not drop below the floor.
#[derive(Debug, Clone, Copy)]
pub struct BalanceFloor {
    pub floor: WorkDuration,
}

impl Rule for BalanceFloor {
    fn name(&self) -> &'static str {
        "balance-floor"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Period(balance) = context else {
            return None;
        };
        if balance.period.is_month() || balance.closing_ms >= self.floor.as_ms() {
            return None;
        }
        Some(period_violation(
            self,
            balance.period,
            format!(
                "balance {} is below the floor of {}",
                format_hm(balance.closing_ms),
                self.floor
            ),
        ))
    }
}

/// Yearly closing balance must not exceed the ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BalanceCeiling {
    pub ceiling: WorkDuration,
}

impl Rule for BalanceCeiling {
    fn name(&self) -> &'static str {
        "balance-ceiling"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Period(balance) = context else {
            return None;
        };
        if balance.period.is_month() || balance.closing_ms <= self.ceiling.as_ms() {
            return None;
        }
        Some(period_violation(
            self,
            balance.period,
            format!(
                "balance {} is above the ceiling of {}",
                format_hm(balance.closing_ms),
                self.ceiling
            ),
        ))
    }
}

/// Caps the number of scans on one day.
#[derive(Debug, Clone, Copy)]
pub struct MaxEventsPerDay {
    pub max: u32,
}

impl Rule for MaxEventsPerDay {
    fn name(&self) -> &'static str {
        "max-events-per-day"
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Diagnostic> {
        let RuleContext::Day { day, .. } = context else {
            return None;
        };
        (day.event_count > self.max).then(|| {
            day_violation(
                self,
                day,
                format!("{} clock events (maximum {})", day.event_count, self.max),
            )
        })
    }
}

/// Ordered registry of rules.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in rules enabled by the thresholds.
    pub fn from_thresholds(thresholds: &RuleThresholds) -> Self {
        let mut set = Self::new();
        if let Some(limit) = thresholds.max_continuous_work {
            set.push(MaxContinuousWork { limit });
        }
        if let Some(minimum) = thresholds.min_rest {
            set.push(MinimumRest { minimum });
        }
        if let Some(minimum) = thresholds.min_break {
            set.push(MinimumBreak { minimum });
        }
        if let Some(floor) = thresholds.balance_floor {
            set.push(BalanceFloor { floor });
        }
        if let Some(ceiling) = thresholds.balance_ceiling {
            set.push(BalanceCeiling { ceiling });
        }
        if let Some(max) = thresholds.max_events_per_day {
            set.push(MaxEventsPerDay { max });
        }
        set
    }

    /// Adds a rule after the existing ones.
    pub fn push(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Names of the registered rules, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Runs every rule against the context.
    pub fn evaluate(&self, context: &RuleContext<'_>) -> Vec<Diagnostic> {
        self.rules.iter().filter_map(|r| r.evaluate(context)).collect()
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, NaiveDate};

    use super::*;
    use crate::ledger::{SessionOrigin, WorkSession};

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn day_with(date: &str, sessions: &[(&str, &str)]) -> DayRecord {
        let date: NaiveDate = date.parse().unwrap();
        let mut day = DayRecord::new(date);
        for (start, end) in sessions {
            let (start, end) = (ts(start), ts(end));
            day.sessions.push(WorkSession {
                day: date,
                start,
                end: Some(end),
                duration_ms: (end - start).num_milliseconds(),
                rollover: false,
                auto_closed: false,
                origin: SessionOrigin::Scanned,
            });
        }
        day.worked_ms = day.sessions.iter().map(|s| s.duration_ms).sum();
        day
    }

    fn year_balance(closing_ms: i64) -> PeriodBalance {
        PeriodBalance {
            period: PeriodId::Year(2025),
            opening_ms: 0,
            worked_ms: 0,
            target_ms: 0,
            adjustment_ms: 0,
            closing_ms,
            provisional: false,
            vacation: None,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn long_session_violates_max_continuous_work() {
        let rule = MaxContinuousWork {
            limit: WorkDuration::from_minutes(330),
        };
        let day = day_with("2025-03-03", &[("2025-03-03T08:00:00+01:00", "2025-03-03T14:10:00+01:00")]);
        let diag = rule
            .evaluate(&RuleContext::Day {
                day: &day,
                previous: None,
            })
            .unwrap();
        assert_eq!(diag.message, "worked 6:10 without a break (limit 5:30)");
        assert_eq!(diag.severity, Severity::Warning);

        let short = day_with("2025-03-03", &[("2025-03-03T08:00:00+01:00", "2025-03-03T13:00:00+01:00")]);
        assert!(
            rule.evaluate(&RuleContext::Day {
                day: &short,
                previous: None
            })
            .is_none()
        );
    }

    #[test]
    fn short_rest_between_days_is_flagged() {
        let rule = MinimumRest {
            minimum: WorkDuration::from_minutes(11 * 60),
        };
        let previous = day_with("2025-03-03", &[("2025-03-03T14:00:00+01:00", "2025-03-03T23:00:00+01:00")]);
        let day = day_with("2025-03-04", &[("2025-03-04T06:00:00+01:00", "2025-03-04T12:00:00+01:00")]);
        let diag = rule
            .evaluate(&RuleContext::Day {
                day: &day,
                previous: Some(&previous),
            })
            .unwrap();
        assert!(diag.message.starts_with("only 7:00 rest"));
    }

    #[test]
    fn short_break_between_sessions_is_flagged() {
        let rule = MinimumBreak {
            minimum: WorkDuration::from_minutes(15),
        };
        let day = day_with(
            "2025-03-03",
            &[
                ("2025-03-03T08:00:00+01:00", "2025-03-03T12:00:00+01:00"),
                ("2025-03-03T12:00:05+01:00", "2025-03-03T16:00:00+01:00"),
            ],
        );
        let diag = rule
            .evaluate(&RuleContext::Day {
                day: &day,
                previous: None,
            })
            .unwrap();
        assert_eq!(diag.message, "only 0:00 break before 12:00 (minimum 0:15)");
        assert_eq!(diag.at, Some(ts("2025-03-03T12:00:05+01:00")));

        let lunch = day_with(
            "2025-03-03",
            &[
                ("2025-03-03T08:00:00+01:00", "2025-03-03T12:00:00+01:00"),
                ("2025-03-03T12:30:00+01:00", "2025-03-03T16:30:00+01:00"),
            ],
        );
        assert!(
            rule.evaluate(&RuleContext::Day {
                day: &lunch,
                previous: None
            })
            .is_none()
        );
    }

    #[test]
    fn balance_limits_apply_to_years_only() {
        let floor = BalanceFloor {
            floor: WorkDuration::from_minutes(-600),
        };
        let ceiling = BalanceCeiling {
            ceiling: WorkDuration::from_minutes(600),
        };
        let low = year_balance(-11 * 3_600_000);
        assert!(floor.evaluate(&RuleContext::Period(&low)).is_some());
        assert!(ceiling.evaluate(&RuleContext::Period(&low)).is_none());

        let mut month = low.clone();
        month.period = PeriodId::Month { year: 2025, month: 3 };
        assert!(floor.evaluate(&RuleContext::Period(&month)).is_none());

        let high = year_balance(11 * 3_600_000);
        assert!(ceiling.evaluate(&RuleContext::Period(&high)).is_some());
    }

    #[test]
    fn too_many_events_per_day() {
        let rule = MaxEventsPerDay { max: 4 };
        let mut day = day_with("2025-03-03", &[]);
        day.event_count = 5;
        let ctx = RuleContext::Day {
            day: &day,
            previous: None,
        };
        assert_eq!(rule.evaluate(&ctx).unwrap().message, "5 clock events (maximum 4)");
    }

    #[test]
    fn rule_set_registers_enabled_rules() {
        let set = RuleSet::from_thresholds(&RuleThresholds::default());
        assert_eq!(
            set.names(),
            ["max-continuous-work", "minimum-rest", "max-events-per-day"]
        );

        struct NoWeekendWork;
        impl Rule for NoWeekendWork {
            fn name(&self) -> &'static str {
                "no-weekend-work"
            }
            fn evaluate(&self, _: &RuleContext<'_>) -> Option<Diagnostic> {
                None
            }
        }
        let set = RuleSet::from_thresholds(&RuleThresholds {
            min_break: Some(WorkDuration::from_minutes(15)),
            ..RuleThresholds::default()
        });
        assert_eq!(
            set.names(),
            ["max-continuous-work", "minimum-rest", "minimum-break", "max-events-per-day"]
        );

        let mut set = RuleSet::new();
        set.push(NoWeekendWork);
        assert_eq!(set.names(), ["no-weekend-work"]);
    }
}
