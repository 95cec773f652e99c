//! Core domain logic for attendance tracking.
//!
//! This crate contains the fundamental types and logic for:
//! - Normalization: ordering raw scans into day-attributed clock boundaries
//! - Reconciliation: pairing boundaries into work sessions
//! - Aggregation: daily deltas and monthly/yearly balances with carry-forward
//! - Rules: configurable per-employee checks reported as diagnostics
//!
//! Nothing here touches the filesystem. Persistence and cross-station
//! coordination live in `tc-store`.

pub mod aggregate;
pub mod diagnostic;
pub mod event;
pub mod ledger;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod reconcile;
pub mod rules;
pub mod types;

pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticScope, Severity, worst_severity};
pub use event::{ClockAction, ScanEvent};
pub use ledger::{
    Absence, AbsenceKind, Admission, DayAmendment, DayRecord, EmployeeLedger, ManualSession,
    PeriodBalance, PeriodId, Percent, SessionOrigin, VacationSummary, WorkSession,
};
pub use pipeline::{CancelFlag, EngineError, evaluate, evaluate_with};
pub use profile::{
    DayBoundary, EmployeeProfile, RuleThresholds, WeeklySchedule, WorkDuration, format_hm,
};
pub use rules::{Rule, RuleContext, RuleSet};
pub use types::{EmployeeId, StationId, ValidationError};
