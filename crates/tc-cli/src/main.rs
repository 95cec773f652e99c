use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::Parser;
use tc_core::{CancelFlag, EmployeeId, PeriodId};
use tc_store::{Attendance, RecordStore};
use tracing_subscriber::EnvFilter;

use tc_cli::commands::{
    amend, balance, day, diagnostics, employees, enroll, recompute, scan, status, util,
};
use tc_cli::{Cli, Commands, Config, station};

/// Load config and open the record store for this station.
fn open_attendance(config_path: Option<&Path>) -> Result<Attendance> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let station = station::resolve(&config.station)?;
    let store = RecordStore::open(&config.store).with_context(|| {
        format!(
            "failed to open record store at {}",
            config.store.directory.display()
        )
    })?;
    let profiles = config
        .profiles()
        .context("invalid employee profile in configuration")?;
    Ok(Attendance::new(store, station, config.lease, profiles))
}

fn evaluation_instant(as_of: Option<&str>) -> Result<DateTime<FixedOffset>> {
    let now = Local::now().fixed_offset();
    as_of.map_or(Ok(now), |s| util::parse_datetime(s, now))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let as_of = evaluation_instant(cli.as_of.as_deref())?;
    let attendance = open_attendance(cli.config.as_deref())?;
    let mut out = std::io::stdout().lock();

    match command {
        Commands::Enroll {
            employee,
            since,
            opening,
        } => {
            let since = since.unwrap_or_else(|| as_of.date_naive());
            enroll::run(&mut out, &attendance, &employee, since, opening, as_of)?;
        }
        Commands::Scan { employee, at, kind } => {
            let at = at
                .as_deref()
                .map_or(Ok(as_of), |s| util::parse_datetime(s, as_of))?;
            scan::run(&mut out, &attendance, &employee, at, kind, as_of)?;
        }
        Commands::Amend {
            employee,
            date,
            absence,
            percent,
            adjust,
            sessions,
            note,
            clear,
        } => {
            let corrections = amend::Corrections {
                absence,
                percent,
                adjust,
                sessions,
                note,
                clear,
            };
            // An explicit --as-of pins the offset of hand-entered sessions.
            let zone = cli.as_of.is_some().then(|| *as_of.offset());
            amend::run(&mut out, &attendance, &employee, date, corrections, zone, as_of)?;
        }
        Commands::Day {
            employee,
            date,
            json,
        } => {
            let date = date.unwrap_or_else(|| today(&attendance, &employee, as_of));
            day::run(&mut out, &attendance, &employee, date, json, as_of)?;
        }
        Commands::Balance {
            employee,
            period,
            json,
        } => {
            let period = period
                .unwrap_or_else(|| PeriodId::month_of(today(&attendance, &employee, as_of)));
            balance::run(&mut out, &attendance, &employee, period, json, as_of)?;
        }
        Commands::Diagnostics { employee, from, to } => {
            let from = match from {
                Some(from) => from,
                None => attendance.store().load(&employee)?.ledger.started_on,
            };
            let to = to.unwrap_or_else(|| today(&attendance, &employee, as_of));
            diagnostics::run(&mut out, &attendance, &employee, from, to, as_of)?;
        }
        Commands::Status { employee } => {
            status::run(&mut out, &attendance, &employee, as_of)?;
        }
        Commands::Recompute => {
            let failed = recompute::run(&mut out, &attendance, as_of, &CancelFlag::new())?;
            if failed > 0 {
                anyhow::bail!("{failed} record(s) could not be recomputed");
            }
        }
        Commands::Employees => {
            employees::run(&mut out, &attendance)?;
        }
    }

    Ok(())
}

/// Working day of `as_of` under the employee's day boundary.
fn today(attendance: &Attendance, employee: &EmployeeId, as_of: DateTime<FixedOffset>) -> NaiveDate {
    attendance
        .profiles()
        .for_employee(employee)
        .day_boundary
        .day_of(&as_of)
}
