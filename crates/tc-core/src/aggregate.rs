//! Balance aggregation.
//!
//! Computes each day's worked time against its target and rolls the daily
//! deltas up into monthly and yearly balances with carry-forward.
//!
//! # Arithmetic
//!
//! All amounts are integer milliseconds, so recomputation is bit-identical.
//!
//! - `target = schedule(date) × (100 − absence%) / 100`
//! - `delta = worked − target + adjustment`
//! - `closing = opening + Σ worked − Σ target + Σ adjustment`
//! - `opening(n) = closing(n − 1)`, the first period opening with the
//!   ledger's opening balance.
//!
//! Days after the evaluation date contribute nothing. Vacation booked on them
//! still shows up as planned in the yearly vacation summary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};

use crate::ledger::{
    AbsenceKind, DayAmendment, DayRecord, PeriodBalance, PeriodId, VacationSummary, WorkSession,
};
use crate::profile::{EmployeeProfile, WeeklySchedule};

/// Days to materialize as [`DayRecord`]s.
///
/// Every day with data is included, plus each day from `started_on` to
/// `as_of_day` with a non-zero scheduled target.
pub fn days_to_materialize(
    started_on: NaiveDate,
    as_of_day: NaiveDate,
    schedule: &WeeklySchedule,
    data_days: impl IntoIterator<Item = NaiveDate>,
) -> BTreeSet<NaiveDate> {
    let mut days: BTreeSet<NaiveDate> = data_days.into_iter().collect();
    days.extend(
        started_on
            .iter_days()
            .take_while(|d| *d <= as_of_day)
            .filter(|d| schedule.target_for(*d).as_ms() != 0),
    );
    days
}

/// Builds the numbers of one day. Diagnostics are attached by the caller.
pub fn day_record(
    date: NaiveDate,
    sessions: Vec<WorkSession>,
    event_count: u32,
    amendment: Option<&DayAmendment>,
    profile: &EmployeeProfile,
    as_of_day: NaiveDate,
) -> DayRecord {
    let mut day = DayRecord::new(date);
    day.sessions = sessions;
    day.event_count = event_count;
    day.absence = amendment.and_then(|a| a.absence);

    if date <= as_of_day {
        day.worked_ms = day.sessions.iter().map(|s| s.duration_ms).sum();
        let scheduled = profile.schedule.target_for(date).as_ms();
        let credited = day.absence.map_or(0, |a| a.percent.of(scheduled));
        day.target_ms = scheduled - credited;
        day.adjustment_ms = amendment.map_or(0, |a| a.adjustment_ms);
        day.delta_ms = day.worked_ms - day.target_ms + day.adjustment_ms;
    }
    day
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    worked_ms: i64,
    target_ms: i64,
    adjustment_ms: i64,
    blocked: bool,
}

impl Totals {
    fn add(&mut self, other: &Self) {
        self.worked_ms += other.worked_ms;
        self.target_ms += other.target_ms;
        self.adjustment_ms += other.adjustment_ms;
        self.blocked |= other.blocked;
    }

    const fn close(&self, opening_ms: i64) -> i64 {
        opening_ms + self.worked_ms - self.target_ms + self.adjustment_ms
    }
}

/// Inputs for [`roll_up`].
#[derive(Debug, Clone, Copy)]
pub struct RollUp<'a> {
    pub started_on: NaiveDate,
    pub opening_balance_ms: i64,
    pub as_of_day: NaiveDate,
    pub profile: &'a EmployeeProfile,
    pub amendments: &'a BTreeMap<NaiveDate, DayAmendment>,
}

/// Computes monthly then yearly balances from `started_on` to `as_of_day`.
///
/// `days` must be sorted by date. Days before `started_on` are ignored.
pub fn roll_up(days: &[DayRecord], input: &RollUp<'_>) -> Vec<PeriodBalance> {
    if input.as_of_day < input.started_on {
        return Vec::new();
    }

    let mut monthly: BTreeMap<PeriodId, Totals> = BTreeMap::new();
    for day in days
        .iter()
        .filter(|d| d.date >= input.started_on && d.date <= input.as_of_day)
    {
        monthly.entry(PeriodId::month_of(day.date)).or_default().add(&Totals {
            worked_ms: day.worked_ms,
            target_ms: day.target_ms,
            adjustment_ms: day.adjustment_ms,
            blocked: day.is_blocked(),
        });
    }

    let mut balances = Vec::new();
    let mut yearly: BTreeMap<i32, Totals> = BTreeMap::new();
    let mut opening_ms = input.opening_balance_ms;
    let mut provisional = false;
    let last = PeriodId::month_of(input.as_of_day);
    let mut month = PeriodId::month_of(input.started_on);
    while month <= last {
        let totals = monthly.get(&month).copied().unwrap_or_default();
        provisional |= totals.blocked;
        let balance = PeriodBalance {
            period: month,
            opening_ms,
            worked_ms: totals.worked_ms,
            target_ms: totals.target_ms,
            adjustment_ms: totals.adjustment_ms,
            closing_ms: totals.close(opening_ms),
            provisional,
            vacation: None,
            diagnostics: Vec::new(),
        };
        opening_ms = balance.closing_ms;
        yearly.entry(month.first_day().year()).or_default().add(&Totals {
            blocked: provisional,
            ..totals
        });
        balances.push(balance);
        month = month.next();
    }

    let mut opening_ms = input.opening_balance_ms;
    for (year, totals) in yearly {
        let closing_ms = totals.close(opening_ms);
        balances.push(PeriodBalance {
            period: PeriodId::Year(year),
            opening_ms,
            worked_ms: totals.worked_ms,
            target_ms: totals.target_ms,
            adjustment_ms: totals.adjustment_ms,
            closing_ms,
            provisional: totals.blocked,
            vacation: Some(vacation_summary(year, input)),
            diagnostics: Vec::new(),
        });
        opening_ms = closing_ms;
    }
    balances
}

/// Vacation bookkeeping for one calendar year.
///
/// Only scheduled working days consume allowance.
fn vacation_summary(year: i32, input: &RollUp<'_>) -> VacationSummary {
    let mut summary = VacationSummary {
        allowance_centidays: i64::from(input.profile.vacation_days_per_year) * 100,
        ..VacationSummary::default()
    };
    for (date, amendment) in input.amendments {
        let Some(absence) = amendment.absence else {
            continue;
        };
        if date.year() != year
            || absence.kind != AbsenceKind::Vacation
            || input.profile.schedule.target_for(*date).as_ms() == 0
        {
            continue;
        }
        let centidays = i64::from(absence.percent.value());
        if *date <= input.as_of_day {
            summary.taken_centidays += centidays;
        } else {
            summary.planned_centidays += centidays;
        }
    }
    summary.remaining_centidays =
        summary.allowance_centidays - summary.taken_centidays - summary.planned_centidays;
    summary
}

/// Balance at the end of `date`: the month's opening plus the deltas of the
/// month's days up to and including `date`.
///
/// `None` when the ledger holds no balance for the month of `date`.
pub fn balance_until(
    days: &[DayRecord],
    balances: &[PeriodBalance],
    date: NaiveDate,
) -> Option<i64> {
    let month = PeriodId::month_of(date);
    let balance = balances.iter().find(|b| b.period == month)?;
    let first = month.first_day();
    let deltas: i64 = days
        .iter()
        .filter(|d| d.date >= first && d.date <= date)
        .map(|d| d.delta_ms)
        .sum();
    Some(balance.opening_ms + deltas)
}

/// Formats hundredths of a day as e.g. `12.5`.
pub fn format_centidays(centidays: i64) -> String {
    let sign = if centidays < 0 { "-" } else { "" };
    let abs = centidays.unsigned_abs();
    match abs % 100 {
        0 => format!("{sign}{}", abs / 100),
        frac if frac % 10 == 0 => format!("{sign}{}.{}", abs / 100, frac / 10),
        frac => format!("{sign}{}.{frac:02}", abs / 100),
    }
}
