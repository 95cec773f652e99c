//! Record HR corrections for one day.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};
use tc_core::{
    Absence, AbsenceKind, DayAmendment, DayBoundary, EmployeeId, Percent, WorkDuration,
};
use tc_store::Attendance;

use super::day::write_day;
use super::util::parse_session;

/// Corrections given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Corrections {
    pub absence: Option<AbsenceKind>,
    pub percent: Option<u8>,
    pub adjust: Option<WorkDuration>,
    pub sessions: Vec<String>,
    pub note: Option<String>,
    /// Remove every correction for the day.
    pub clear: bool,
}

impl Corrections {
    /// Builds the amendment. Session times are anchored to the working day
    /// and read in `zone`.
    ///
    /// Fails when nothing was given and `clear` is not set, so a bare
    /// `amend` never wipes a day by accident.
    pub fn into_amendment<Tz: TimeZone>(
        self,
        date: NaiveDate,
        boundary: DayBoundary,
        zone: &Tz,
    ) -> Result<DayAmendment> {
        if self.clear {
            return Ok(DayAmendment::default());
        }
        let absence = match self.absence {
            Some(kind) => {
                let percent = Percent::new(self.percent.unwrap_or(100))?;
                Some(Absence { kind, percent })
            }
            None => None,
        };
        let manual_sessions = self
            .sessions
            .iter()
            .map(|s| parse_session(s, date, boundary, zone))
            .collect::<Result<Vec<_>>>()?;
        let amendment = DayAmendment {
            absence,
            adjustment_ms: self.adjust.map_or(0, WorkDuration::as_ms),
            manual_sessions,
            note: self.note,
        };
        if amendment.is_empty() {
            anyhow::bail!(
                "nothing to amend on {date}: give --absence, --adjust, --session or --note, or --clear to remove the day's corrections"
            );
        }
        Ok(amendment)
    }
}

/// Replaces the amendment of `date`.
///
/// `zone` is the offset session times are read in; `None` means the local
/// time zone, resolved on the amended date.
pub fn run<W: Write>(
    writer: &mut W,
    attendance: &Attendance,
    employee_id: &EmployeeId,
    date: NaiveDate,
    corrections: Corrections,
    zone: Option<FixedOffset>,
    as_of: DateTime<FixedOffset>,
) -> Result<()> {
    let boundary = attendance.profiles().for_employee(employee_id).day_boundary;
    let amendment = match zone {
        Some(offset) => corrections.into_amendment(date, boundary, &offset)?,
        None => corrections.into_amendment(date, boundary, &Local)?,
    };
    let cleared = amendment.is_empty();
    let record = attendance
        .amend_day(employee_id, date, amendment, as_of)
        .with_context(|| format!("failed to amend {date} for {employee_id}"))?;

    if cleared {
        writeln!(writer, "Cleared corrections for {employee_id} on {date}.")?;
    } else {
        writeln!(writer, "Amended {employee_id} on {date}.")?;
    }
    match record {
        Some(record) => write_day(writer, &record)?,
        None => writeln!(writer, "The day is outside the ledger.")?,
    }
    Ok(())
}
