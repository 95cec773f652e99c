//! Status command: clock state and running balances for one employee.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use tc_core::aggregate::balance_until;
use tc_core::{EmployeeId, PeriodId, format_hm, worst_severity};
use tc_store::Attendance;

use super::signed_hm;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let ledger = attendance.snapshot(employee_id, as_of)?;
    let today = attendance
        .profiles()
        .for_employee(employee_id)
        .day_boundary
        .day_of(&as_of);

    let open = ledger
        .days
        .iter()
        .flat_map(|d| &d.sessions)
        .find(|s| s.is_open());
    match open {
        Some(session) => writeln!(
            writer,
            "{employee_id} is clocked in since {}.",
            session.start.format("%Y-%m-%d %H:%M")
        )?,
        None => writeln!(writer, "{employee_id} is clocked out.")?,
    }

    if let Some(day) = ledger.day(today) {
        writeln!(
            writer,
            "Today ({today}): worked {} of {}",
            format_hm(day.worked_ms),
            format_hm(day.target_ms)
        )?;
    }
    if let Some(until) = today
        .pred_opt()
        .and_then(|yesterday| balance_until(&ledger.days, &ledger.balances, yesterday))
    {
        writeln!(writer, "Balance until yesterday: {}", signed_hm(until))?;
    }
    if let Some(month) = ledger.balance(PeriodId::month_of(today)) {
        let status = if month.provisional {
            " (provisional)"
        } else {
            ""
        };
        writeln!(
            writer,
            "Balance {}: {}{status}",
            month.period,
            signed_hm(month.closing_ms)
        )?;
    }
    if let Some(worst) = worst_severity(ledger.diagnostics()) {
        let count = ledger.diagnostics().count();
        writeln!(writer, "Diagnostics: {count} (worst: {worst})")?;
    }
    Ok(())
}
