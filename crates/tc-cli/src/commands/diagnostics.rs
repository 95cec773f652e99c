//! List diagnostics for a date range.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate};
use tc_core::{EmployeeId, worst_severity};
use tc_store::Attendance;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    from: NaiveDate,
    to: NaiveDate,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let diagnostics = attendance.list_diagnostics(employee_id, from, to, as_of)?;

    writeln!(writer, "Diagnostics for {employee_id} from {from} to {to}")?;
    if diagnostics.is_empty() {
        writeln!(writer, "None.")?;
        return Ok(());
    }
    for diagnostic in &diagnostics {
        writeln!(writer, "- {diagnostic}")?;
    }
    let blocking = diagnostics.iter().filter(|d| d.is_blocking()).count();
    if let Some(worst) = worst_severity(&diagnostics) {
        writeln!(
            writer,
            "{} finding(s), {blocking} blocking, worst: {worst}",
            diagnostics.len()
        )?;
    }
    Ok(())
}
