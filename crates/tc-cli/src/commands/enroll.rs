//! Create an employee's ledger.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use tc_core::{EmployeeId, WorkDuration};
use tc_store::Attendance;

use super::signed_hm;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    started_on: NaiveDate,
    opening: WorkDuration,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let ledger = attendance
        .enroll(employee_id, started_on, opening.as_ms(), as_of)
        .with_context(|| format!("failed to enroll {employee_id}"))?;

    writeln!(
        writer,
        "Enrolled {employee_id} from {} with opening balance {}.",
        ledger.started_on,
        signed_hm(ledger.opening_balance_ms)
    )?;
    writeln!(
        writer,
        "Record: {}",
        attendance.store().record_path(employee_id).display()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::testing::{attendance, date, employee, output, ts};

    #[test]
    fn enroll_command_creates_record() {
        let temp = tempfile::tempdir().unwrap();
        let attendance = attendance(temp.path());

        let mut buf = Vec::new();
        run(
            &mut buf,
            &attendance,
            &employee(),
            date(2025, 3, 1),
            WorkDuration::from_minutes(-90),
            ts("2025-03-03T07:00:00+01:00"),
        )
        .unwrap();

        let text = output(buf).replace(&temp.path().display().to_string(), "[TEMP]");
        assert_snapshot!(text, @r"
        Enrolled 042 from 2025-03-01 with opening balance -1:30.
        Record: [TEMP]/042.ledger.json
        ");
        assert!(temp.path().join("042.ledger.json").exists());
    }

    #[test]
    fn enrolling_twice_fails() {
        let temp = tempfile::tempdir().unwrap();
        let attendance = attendance(temp.path());
        let as_of = ts("2025-03-03T07:00:00+01:00");
        let since = date(2025, 3, 1);

        run(&mut Vec::new(), &attendance, &employee(), since, WorkDuration::default(), as_of)
            .unwrap();
        let err = run(&mut Vec::new(), &attendance, &employee(), since, WorkDuration::default(), as_of)
            .unwrap_err();
        assert!(format!("{err:#}").contains("already"), "{err:#}");
    }
}
