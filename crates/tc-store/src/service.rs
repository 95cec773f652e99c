//! The attendance service used by stations and report consumers.
//!
//! Mutations run as coordinated cycles (see [`Coordinator`]). Queries load the
//! record without a lease and re-evaluate it at the caller's instant; the
//! atomic replace guarantees they never see a partial file.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tc_core::aggregate;
use tc_core::{
    Admission, CancelFlag, DayAmendment, DayRecord, Diagnostic, DiagnosticKind, EmployeeId,
    EmployeeLedger, EmployeeProfile, PeriodBalance, PeriodId, ScanEvent, Severity, StationId,
    evaluate,
};

use crate::coordinator::{Committed, Coordinator};
use crate::error::StoreError;
use crate::lease::LeaseConfig;
use crate::store::RecordStore;

/// Employee profiles: one default plus per-employee overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profiles {
    #[serde(default)]
    pub default: EmployeeProfile,
    #[serde(default)]
    pub employees: BTreeMap<EmployeeId, EmployeeProfile>,
}

impl Profiles {
    /// Profile in force for the employee.
    pub fn for_employee(&self, employee_id: &EmployeeId) -> &EmployeeProfile {
        self.employees.get(employee_id).unwrap_or(&self.default)
    }
}

/// Outcome of a submitted scan.
#[derive(Debug, Clone)]
pub struct Submission {
    pub admission: Admission,
    /// Clock state after the scan.
    pub clocked_in: bool,
    /// The working day of the session the scan opened or closed, as
    /// re-evaluated. An overnight clock-out reports the day it started on.
    pub day: Option<DayRecord>,
    /// Revision written.
    pub revision: u64,
}

/// Per-employee result of [`Attendance::recompute_all`].
#[derive(Debug)]
pub struct RecomputeOutcome {
    pub employee_id: EmployeeId,
    pub result: Result<RecomputeSummary, StoreError>,
}

/// What a successful recompute produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub revision: u64,
    pub day_count: usize,
    pub provisional_periods: usize,
    pub blocking_diagnostics: usize,
}

/// Attendance operations for one station.
#[derive(Debug, Clone)]
pub struct Attendance {
    coordinator: Coordinator,
    profiles: Profiles,
}

impl Attendance {
    pub const fn new(
        store: RecordStore,
        station: StationId,
        lease: LeaseConfig,
        profiles: Profiles,
    ) -> Self {
        Self {
            coordinator: Coordinator::new(store, station, lease),
            profiles,
        }
    }

    pub const fn store(&self) -> &RecordStore {
        self.coordinator.store()
    }

    pub const fn station(&self) -> &StationId {
        self.coordinator.station()
    }

    pub const fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    /// Creates an employee's record.
    pub fn enroll(
        &self,
        employee_id: &EmployeeId,
        started_on: NaiveDate,
        opening_balance_ms: i64,
        as_of: DateTime<FixedOffset>,
    ) -> Result<EmployeeLedger, StoreError> {
        if self.store().contains(employee_id) {
            return Err(StoreError::AlreadyEnrolled(employee_id.clone()));
        }
        let ledger = EmployeeLedger::new(employee_id.clone(), started_on, opening_balance_ms);
        let committed = self.coordinator.create(
            ledger,
            self.profiles.for_employee(employee_id),
            as_of,
            &CancelFlag::new(),
        )?;
        Ok(committed.ledger)
    }

    /// Records a scan in one coordinated cycle.
    pub fn submit_event(
        &self,
        event: ScanEvent,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Submission, StoreError> {
        self.submit(event, as_of, false)
    }

    /// Like [`submit_event`](Self::submit_event), retrying conflicts and lease
    /// timeouts up to the configured number of attempts.
    ///
    /// When a retry succeeds after a conflict, a `stale-conflict` note is
    /// appended to the ledger in the successful cycle.
    pub fn submit_event_with_retry(
        &self,
        event: ScanEvent,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Submission, StoreError> {
        self.retrying(&event.employee_id, |after_conflict| {
            self.submit(event.clone(), as_of, after_conflict)
        })
    }

    /// Repeats `attempt` while it fails with a retryable error. The flag
    /// passed in tells whether an earlier attempt hit a conflict.
    fn retrying<T>(
        &self,
        employee_id: &EmployeeId,
        mut attempt: impl FnMut(bool) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lease = self.coordinator.lease_config();
        let attempts = lease.retry_attempts.max(1);
        let mut conflicted = false;
        let mut tries = 1;
        loop {
            match attempt(conflicted) {
                Err(err) if err.is_retryable() && tries < attempts => {
                    tracing::warn!(
                        employee_id = %employee_id,
                        attempt = tries,
                        error = %err,
                        "retrying scan submission"
                    );
                    conflicted |= matches!(err, StoreError::Conflict { .. });
                    tries += 1;
                    std::thread::sleep(lease.retry_delay());
                }
                result => return result,
            }
        }
    }

    fn submit(
        &self,
        event: ScanEvent,
        as_of: DateTime<FixedOffset>,
        after_conflict: bool,
    ) -> Result<Submission, StoreError> {
        let employee_id = event.employee_id.clone();
        let profile = self.profiles.for_employee(&employee_id);
        let at = event.timestamp;
        let station = self.station().clone();

        let committed = self.coordinator.with_ledger(
            &employee_id,
            profile,
            as_of,
            &CancelFlag::new(),
            |ledger| {
                if after_conflict {
                    ledger.record_anomaly(Diagnostic::ledger(
                        DiagnosticKind::StaleConflict,
                        Severity::Info,
                        event.timestamp,
                        format!("scan from {station} was re-applied after a concurrent write"),
                    ));
                }
                let admission = ledger.admit(event, profile.debounce_ms)?;
                Ok(admission)
            },
        )?;

        match committed.value {
            Admission::Recorded => tracing::debug!(employee_id = %employee_id, "scan recorded"),
            Admission::Duplicate => tracing::debug!(employee_id = %employee_id, "duplicate scan"),
            Admission::Debounced => tracing::debug!(employee_id = %employee_id, "scan debounced"),
        }
        Ok(Submission {
            admission: committed.value,
            clocked_in: clocked_in(&committed.ledger),
            day: committed
                .ledger
                .day_of_scan(at)
                .or_else(|| committed.ledger.day(profile.day_boundary.day_of(&at)))
                .cloned(),
            revision: committed.ledger.revision,
        })
    }

    /// Stores HR corrections for a date and returns the re-evaluated day.
    pub fn amend_day(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        amendment: DayAmendment,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Option<DayRecord>, StoreError> {
        let Committed { ledger, .. } = self.coordinator.with_ledger(
            employee_id,
            self.profiles.for_employee(employee_id),
            as_of,
            &CancelFlag::new(),
            |ledger| {
                ledger.amend(date, amendment);
                Ok(())
            },
        )?;
        Ok(ledger.day(date).cloned())
    }

    /// Loads the ledger and evaluates it at `as_of` without saving.
    pub fn snapshot(
        &self,
        employee_id: &EmployeeId,
        as_of: DateTime<FixedOffset>,
    ) -> Result<EmployeeLedger, StoreError> {
        let mut ledger = self.store().load(employee_id)?.ledger;
        evaluate(
            &mut ledger,
            self.profiles.for_employee(employee_id),
            as_of,
            &CancelFlag::new(),
        )?;
        Ok(ledger)
    }

    pub fn get_day_record(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Option<DayRecord>, StoreError> {
        Ok(self.snapshot(employee_id, as_of)?.day(date).cloned())
    }

    pub fn get_period_balance(
        &self,
        employee_id: &EmployeeId,
        period: PeriodId,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Option<PeriodBalance>, StoreError> {
        Ok(self.snapshot(employee_id, as_of)?.balance(period).cloned())
    }

    /// Diagnostics touching `[from, to]`: day, period and store anomalies.
    pub fn list_diagnostics(
        &self,
        employee_id: &EmployeeId,
        from: NaiveDate,
        to: NaiveDate,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Vec<Diagnostic>, StoreError> {
        let ledger = self.snapshot(employee_id, as_of)?;
        Ok(ledger
            .diagnostics()
            .filter(|d| d.touches(from, to))
            .cloned()
            .collect())
    }

    /// Whether the employee has an open session at `as_of`.
    pub fn is_clocked_in(
        &self,
        employee_id: &EmployeeId,
        as_of: DateTime<FixedOffset>,
    ) -> Result<bool, StoreError> {
        Ok(clocked_in(&self.snapshot(employee_id, as_of)?))
    }

    /// Balance at the end of `date` (e.g. yesterday), evaluated at `as_of`.
    pub fn balance_until(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Option<i64>, StoreError> {
        let ledger = self.snapshot(employee_id, as_of)?;
        Ok(aggregate::balance_until(&ledger.days, &ledger.balances, date))
    }

    pub fn list_employees(&self) -> Result<Vec<EmployeeId>, StoreError> {
        self.store().list()
    }

    /// Re-derives and saves every employee's ledger, in parallel.
    ///
    /// Failures are reported per employee; one corrupt record does not stop
    /// the others. Cancellation stops employees that have not been saved yet.
    pub fn recompute_all(
        &self,
        as_of: DateTime<FixedOffset>,
        cancel: &CancelFlag,
    ) -> Result<Vec<RecomputeOutcome>, StoreError> {
        let employees = self.list_employees()?;
        tracing::debug!(employee_count = employees.len(), "recomputing all ledgers");

        let outcomes = employees
            .into_par_iter()
            .map(|employee_id| {
                let result = self
                    .coordinator
                    .with_ledger(
                        &employee_id,
                        self.profiles.for_employee(&employee_id),
                        as_of,
                        cancel,
                        |_| Ok(()),
                    )
                    .map(|committed| summarize(&committed.ledger));
                if let Err(err) = &result {
                    if err.is_corrupt() {
                        tracing::warn!(employee_id = %employee_id, error = %err, "skipping corrupt record");
                    }
                }
                RecomputeOutcome {
                    employee_id,
                    result,
                }
            })
            .collect();
        Ok(outcomes)
    }
}

fn clocked_in(ledger: &EmployeeLedger) -> bool {
    ledger.days.iter().any(DayRecord::has_open_session)
}

fn summarize(ledger: &EmployeeLedger) -> RecomputeSummary {
    RecomputeSummary {
        revision: ledger.revision,
        day_count: ledger.days.len(),
        provisional_periods: ledger.balances.iter().filter(|b| b.provisional).count(),
        blocking_diagnostics: ledger.diagnostics().filter(|d| d.is_blocking()).count(),
    }
}
