//! Record a badge scan.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use tc_core::{Admission, ClockAction, EmployeeId, ScanEvent, format_hm};
use tc_store::Attendance;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    at: DateTime<FixedOffset>,
    kind: Option<ClockAction>,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let mut event = ScanEvent::new(employee_id.clone(), at).with_station(attendance.station().clone());
    if let Some(kind) = kind {
        event = event.with_kind(kind);
    }

    let submission = attendance
        .submit_event_with_retry(event, as_of.max(at))
        .with_context(|| format!("failed to record scan for {employee_id}"))?;

    let time = at.format("%H:%M");
    match submission.admission {
        Admission::Recorded if submission.clocked_in => {
            writeln!(writer, "{employee_id} clocked in at {time}.")?;
        }
        Admission::Recorded => {
            writeln!(writer, "{employee_id} clocked out at {time}.")?;
        }
        Admission::Duplicate => {
            writeln!(writer, "Scan at {time} was already recorded for {employee_id}.")?;
        }
        Admission::Debounced => {
            writeln!(writer, "Scan at {time} ignored: too close to the previous scan.")?;
        }
    }
    if let Some(day) = &submission.day {
        writeln!(writer, "Worked {} on {}.", format_hm(day.worked_ms), day.date)?;
        for diagnostic in &day.diagnostics {
            writeln!(writer, "! {diagnostic}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::testing::{attendance, date, employee, output, ts};

    fn enrolled(dir: &std::path::Path) -> Attendance {
        let attendance = attendance(dir);
        attendance
            .enroll(&employee(), date(2025, 3, 3), 0, ts("2025-03-03T07:00:00+01:00"))
            .unwrap();
        attendance
    }

    fn scan(attendance: &Attendance, at: &str) -> String {
        let mut buf = Vec::new();
        run(&mut buf, attendance, &employee(), ts(at), None, ts(at)).unwrap();
        output(buf)
    }

    #[test]
    fn scans_toggle_in_and_out() {
        let temp = tempfile::tempdir().unwrap();
        let attendance = enrolled(temp.path());

        assert_snapshot!(scan(&attendance, "2025-03-03T08:00:00+01:00"), @r"
        042 clocked in at 08:00.
        Worked 0:00 on 2025-03-03.
        ! [blocking] 2025-03-03 missing-clock-out: clock-in at 2025-03-03 08:00 has no clock-out yet
        ");
        assert_snapshot!(scan(&attendance, "2025-03-03T12:15:00+01:00"), @r"
        042 clocked out at 12:15.
        Worked 4:15 on 2025-03-03.
        ");
    }

    #[test]
    fn quick_repeat_is_debounced() {
        let temp = tempfile::tempdir().unwrap();
        let attendance = enrolled(temp.path());

        scan(&attendance, "2025-03-03T08:00:00+01:00");
        let text = scan(&attendance, "2025-03-03T08:00:02+01:00");
        assert!(text.starts_with("Scan at 08:00 ignored"), "{text}");
        assert!(attendance.is_clocked_in(&employee(), ts("2025-03-03T08:01:00+01:00")).unwrap());
    }

    #[test]
    fn unknown_employee_fails() {
        let temp = tempfile::tempdir().unwrap();
        let attendance = attendance(temp.path());
        let at = ts("2025-03-03T08:00:00+01:00");

        let err = run(&mut Vec::new(), &attendance, &employee(), at, None, at).unwrap_err();
        assert!(format!("{err:#}").contains("042"), "{err:#}");
    }
}
