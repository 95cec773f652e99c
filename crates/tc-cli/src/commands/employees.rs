//! List enrolled employees.

use std::io::Write;

use anyhow::Result;
use tc_store::Attendance;

pub fn run<W: Write>(writer: &mut W, attendance: &Attendance) -> Result<()> {
    let employees = attendance.list_employees()?;
    writeln!(writer, "Records in {}", attendance.store().dir().display())?;
    if employees.is_empty() {
        writeln!(writer, "No employees enrolled.")?;
        return Ok(());
    }
    for employee_id in employees {
        writeln!(writer, "- {employee_id}")?;
    }
    Ok(())
}
