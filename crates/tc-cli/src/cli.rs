//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tc_core::{AbsenceKind, ClockAction, EmployeeId, PeriodId, WorkDuration};

/// Badge-scan attendance ledger.
///
/// Records clock-in/clock-out scans into per-employee ledgers on a shared
/// directory and derives daily records, running balances and diagnostics.
#[derive(Debug, Parser)]
#[command(name = "tc", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Evaluate as of this instant instead of now (RFC 3339 or e.g. "2 hours ago").
    #[arg(long, global = true, value_name = "DATETIME")]
    pub as_of: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a ledger for a new employee.
    Enroll {
        employee: EmployeeId,

        /// First day the ledger covers. Defaults to the evaluation date.
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Balance carried over from before the ledger, as H:MM (may be negative).
        #[arg(long, default_value = "0:00", allow_hyphen_values = true)]
        opening: WorkDuration,
    },

    /// Record a badge scan.
    Scan {
        employee: EmployeeId,

        /// Scan instant. Defaults to the evaluation instant.
        #[arg(long, value_name = "DATETIME")]
        at: Option<String>,

        /// Explicit direction; toggles when omitted.
        #[arg(long)]
        kind: Option<ClockAction>,
    },

    /// Correct a day: absences, adjustments and hand-entered sessions.
    ///
    /// Replaces the day's earlier corrections. Use --clear to remove them.
    Amend {
        employee: EmployeeId,

        date: NaiveDate,

        /// Absence type (vacation, sick, holiday, other).
        #[arg(long)]
        absence: Option<AbsenceKind>,

        /// Share of the day covered by the absence. Default: 100.
        #[arg(long, requires = "absence")]
        percent: Option<u8>,

        /// Signed correction added to the day's delta, as H:MM.
        #[arg(long, allow_hyphen_values = true)]
        adjust: Option<WorkDuration>,

        /// Hand-entered session as HH:MM-HH:MM (repeatable), on the working
        /// day's wall clock. Read in the local time zone, or in the offset of
        /// --as-of when given.
        #[arg(long = "session", value_name = "HH:MM-HH:MM")]
        sessions: Vec<String>,

        /// Free-text note kept with the amendment.
        #[arg(long)]
        note: Option<String>,

        /// Remove every correction for the day.
        #[arg(long, conflicts_with_all = ["absence", "adjust", "sessions", "note"])]
        clear: bool,
    },

    /// Show one day's record.
    Day {
        employee: EmployeeId,

        /// Defaults to the evaluation date.
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the balance of a month (YYYY-MM) or year (YYYY).
    Balance {
        employee: EmployeeId,

        /// Defaults to the month of the evaluation date.
        period: Option<PeriodId>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List diagnostics in a date range.
    Diagnostics {
        employee: EmployeeId,

        /// Defaults to the start of the ledger.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Defaults to the evaluation date.
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show whether an employee is clocked in, with today's totals.
    Status { employee: EmployeeId },

    /// Re-evaluate and save every employee's ledger.
    Recompute,

    /// List enrolled employees.
    Employees,
}
