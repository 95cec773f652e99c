//! Read-modify-write cycles on a single employee record.
//!
//! Every mutation runs as one cycle:
//!
//! 1. acquire the record's lease
//! 2. load the ledger and its fingerprint
//! 3. append a `lease-reclaimed` anomaly if an abandoned lease was taken over
//! 4. apply the mutation
//! 5. re-evaluate the ledger
//! 6. save it under the fingerprint check
//! 7. release the lease (also on every error path)
//!
//! Nothing is written unless every step before the save succeeded, with one
//! exception: when the lease was reclaimed and the cycle then fails, the
//! `lease-reclaimed` anomaly alone is saved before the lease is released, so
//! the takeover is never lost.

use chrono::{DateTime, FixedOffset, Utc};
use tc_core::{
    CancelFlag, Diagnostic, DiagnosticKind, EmployeeId, EmployeeLedger, EmployeeProfile, Severity,
    StationId, evaluate,
};

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::lease::{self, LeaseConfig, LeaseMarker};
use crate::store::RecordStore;

/// Result of a committed cycle.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    /// The ledger as saved.
    pub ledger: EmployeeLedger,
    pub fingerprint: Fingerprint,
}

/// Runs read-modify-write cycles for one station.
#[derive(Debug, Clone)]
pub struct Coordinator {
    store: RecordStore,
    station: StationId,
    lease: LeaseConfig,
}

impl Coordinator {
    pub const fn new(store: RecordStore, station: StationId, lease: LeaseConfig) -> Self {
        Self {
            store,
            station,
            lease,
        }
    }

    pub const fn store(&self) -> &RecordStore {
        &self.store
    }

    pub const fn station(&self) -> &StationId {
        &self.station
    }

    pub const fn lease_config(&self) -> &LeaseConfig {
        &self.lease
    }

    /// Runs one cycle on an existing record.
    pub fn with_ledger<T>(
        &self,
        employee_id: &EmployeeId,
        profile: &EmployeeProfile,
        as_of: DateTime<FixedOffset>,
        cancel: &CancelFlag,
        mutate: impl FnOnce(&mut EmployeeLedger) -> Result<T, StoreError>,
    ) -> Result<Committed<T>, StoreError> {
        let lease = lease::acquire(&self.store, employee_id, &self.station, &self.lease)?;
        let reclaimed = lease.reclaimed().map(|previous| self.reclaim_diagnostic(previous));

        let committed = match self.cycle(employee_id, profile, as_of, cancel, reclaimed.clone(), mutate) {
            Ok(committed) => committed,
            Err(err) => {
                if let Some(anomaly) = reclaimed {
                    self.save_anomaly(employee_id, anomaly);
                }
                return Err(err);
            }
        };
        lease.release()?;

        tracing::info!(
            employee_id = %employee_id,
            revision = committed.ledger.revision,
            station = %self.station,
            "committed record"
        );
        Ok(committed)
    }

    fn cycle<T>(
        &self,
        employee_id: &EmployeeId,
        profile: &EmployeeProfile,
        as_of: DateTime<FixedOffset>,
        cancel: &CancelFlag,
        reclaimed: Option<Diagnostic>,
        mutate: impl FnOnce(&mut EmployeeLedger) -> Result<T, StoreError>,
    ) -> Result<Committed<T>, StoreError> {
        let loaded = self.store.load(employee_id)?;
        let mut ledger = loaded.ledger;
        if let Some(anomaly) = reclaimed {
            ledger.record_anomaly(anomaly);
        }

        let value = mutate(&mut ledger)?;
        evaluate(&mut ledger, profile, as_of, cancel)?;
        let fingerprint = self
            .store
            .save(&mut ledger, Some(&loaded.fingerprint), &self.station, now())?;
        Ok(Committed {
            value,
            ledger,
            fingerprint,
        })
    }

    /// Persists a reclaim anomaly on its own after a failed cycle. The lease
    /// is still held, so the fresh load cannot race another station.
    fn save_anomaly(&self, employee_id: &EmployeeId, anomaly: Diagnostic) {
        let result = self.store.load(employee_id).and_then(|loaded| {
            let mut ledger = loaded.ledger;
            ledger.record_anomaly(anomaly);
            self.store
                .save(&mut ledger, Some(&loaded.fingerprint), &self.station, now())
        });
        match result {
            Ok(_) => tracing::debug!(employee_id = %employee_id, "saved lease reclaim after failed cycle"),
            Err(err) => tracing::warn!(
                employee_id = %employee_id,
                error = %err,
                "could not record lease reclaim"
            ),
        }
    }

    /// Creates a record under the lease.
    pub fn create(
        &self,
        mut ledger: EmployeeLedger,
        profile: &EmployeeProfile,
        as_of: DateTime<FixedOffset>,
        cancel: &CancelFlag,
    ) -> Result<Committed<()>, StoreError> {
        let employee_id = ledger.employee_id.clone();
        let lease = lease::acquire(&self.store, &employee_id, &self.station, &self.lease)?;
        let reclaimed = lease.reclaimed().map(|previous| self.reclaim_diagnostic(previous));
        if let Some(anomaly) = &reclaimed {
            ledger.record_anomaly(anomaly.clone());
        }
        let created = evaluate(&mut ledger, profile, as_of, cancel)
            .map_err(StoreError::from)
            .and_then(|()| self.store.create(&mut ledger, &self.station, now()));
        let fingerprint = match created {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                if let Some(anomaly) = reclaimed {
                    if self.store.contains(&employee_id) {
                        self.save_anomaly(&employee_id, anomaly);
                    }
                }
                return Err(err);
            }
        };
        lease.release()?;

        tracing::info!(employee_id = %ledger.employee_id, station = %self.station, "enrolled employee");
        Ok(Committed {
            value: (),
            ledger,
            fingerprint,
        })
    }

    fn reclaim_diagnostic(&self, previous: &LeaseMarker) -> Diagnostic {
        Diagnostic::ledger(
            DiagnosticKind::LeaseReclaimed,
            Severity::Warning,
            now(),
            format!(
                "lease held by {} since {} was reclaimed by {}",
                previous.owner,
                previous.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
                self.station
            ),
        )
    }
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}
