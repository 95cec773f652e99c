//! Show one employee's day record.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate};
use tc_core::{DayRecord, EmployeeId, SessionOrigin, WorkSession, format_hm};
use tc_store::Attendance;

use super::signed_hm;

pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    date: NaiveDate,
    json: bool,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let Some(record) = attendance.get_day_record(employee_id, date, as_of)? else {
        writeln!(writer, "No record for {employee_id} on {date}.")?;
        return Ok(());
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &record)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "{employee_id} on {date}")?;
    write_day(writer, &record)
}

/// Writes the body of a day record.
pub fn write_day<W: Write>(writer: &mut W, day: &DayRecord) -> Result<()> {
    if day.sessions.is_empty() {
        writeln!(writer, "No sessions.")?;
    } else {
        writeln!(writer, "Sessions:")?;
        for session in &day.sessions {
            writeln!(writer, "- {}", describe_session(session))?;
        }
    }
    if let Some(absence) = day.absence {
        writeln!(writer, "Absence: {} {}%", absence.kind, absence.percent.value())?;
    }
    writeln!(
        writer,
        "Worked {}, target {}, adjustment {}, delta {}",
        format_hm(day.worked_ms),
        format_hm(day.target_ms),
        signed_hm(day.adjustment_ms),
        signed_hm(day.delta_ms)
    )?;
    for diagnostic in &day.diagnostics {
        writeln!(writer, "! {diagnostic}")?;
    }
    Ok(())
}

fn describe_session(session: &WorkSession) -> String {
    let end = session
        .end
        .map_or_else(|| "open".to_string(), |end| end.format("%H:%M").to_string());
    let mut notes = Vec::new();
    if session.origin == SessionOrigin::Manual {
        notes.push("manual");
    }
    if session.auto_closed {
        notes.push("auto-closed");
    }
    if session.rollover {
        notes.push("past day end");
    }
    let notes = if notes.is_empty() {
        String::new()
    } else {
        format!(" ({})", notes.join(", "))
    };
    format!(
        "{}-{} {}{notes}",
        session.start.format("%H:%M"),
        end,
        format_hm(session.duration_ms)
    )
}
