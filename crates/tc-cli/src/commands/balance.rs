//! Show a month's or year's running balance.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use tc_core::aggregate::format_centidays;
use tc_core::{EmployeeId, PeriodBalance, PeriodId, format_hm};
use tc_store::Attendance;

use super::signed_hm;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    period: PeriodId,
    json: bool,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let Some(balance) = attendance.get_period_balance(employee_id, period, as_of)? else {
        writeln!(writer, "No balance for {employee_id} in {period}.")?;
        return Ok(());
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &balance)?;
        writeln!(writer)?;
        return Ok(());
    }

    write_balance(writer, employee_id, &balance)
}

fn write_balance<W: Write>(
    writer: &mut W,
    employee_id: &EmployeeId,
    balance: &PeriodBalance,
) -> Result<()> {
    let status = if balance.provisional {
        "provisional"
    } else {
        "final"
    };
    writeln!(writer, "{employee_id} in {} ({status})", balance.period)?;
    writeln!(writer, "Opening:    {}", signed_hm(balance.opening_ms))?;
    writeln!(writer, "Worked:     {}", format_hm(balance.worked_ms))?;
    writeln!(writer, "Target:     {}", format_hm(balance.target_ms))?;
    writeln!(writer, "Adjustment: {}", signed_hm(balance.adjustment_ms))?;
    writeln!(writer, "Closing:    {}", signed_hm(balance.closing_ms))?;
    if let Some(vacation) = &balance.vacation {
        writeln!(
            writer,
            "Vacation: {} taken, {} planned, {} of {} days remaining",
            format_centidays(vacation.taken_centidays),
            format_centidays(vacation.planned_centidays),
            format_centidays(vacation.remaining_centidays),
            format_centidays(vacation.allowance_centidays)
        )?;
    }
    for diagnostic in &balance.diagnostics {
        writeln!(writer, "! {diagnostic}")?;
    }
    Ok(())
}
