//! Re-derive and save every employee's ledger.
//!
//! Useful after changing schedules or rule thresholds in the configuration:
//! stored day records and balances are rebuilt from the raw scans.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use tc_core::CancelFlag;
use tc_store::Attendance;

/// Returns the number of employees that could not be recomputed.
pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    as_of: DateTime<FixedOffset>,
    cancel: &CancelFlag,
) -> Result<usize> {
    let mut outcomes = attendance.recompute_all(as_of, cancel)?;
    if outcomes.is_empty() {
        writeln!(writer, "No employees to recompute.")?;
        return Ok(0);
    }
    outcomes.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));

    writeln!(writer, "Recomputing {} employee(s)...", outcomes.len())?;
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => writeln!(
                writer,
                "- {}: revision {}, {} day(s), {} provisional period(s), {} blocking finding(s)",
                outcome.employee_id,
                summary.revision,
                summary.day_count,
                summary.provisional_periods,
                summary.blocking_diagnostics
            )?,
            Err(err) => {
                failed += 1;
                writeln!(writer, "- {}: failed: {err}", outcome.employee_id)?;
            }
        }
    }
    writeln!(
        writer,
        "Done: {} recomputed, {failed} failed.",
        outcomes.len() - failed
    )?;
    Ok(failed)
}
