//! Several stations sharing one record directory.
//!
//! Threads stand in for stations: each builds its own `Attendance` with its
//! own station label over the same directory.

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use tc_core::{Admission, ClockAction, DiagnosticKind, EmployeeId, PeriodId, ScanEvent, StationId};
use tc_store::{
    Attendance, LeaseConfig, LeaseMarker, Profiles, RecordStore, StoreConfig, StoreError,
};

fn ts(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn employee() -> EmployeeId {
    EmployeeId::new("042").unwrap()
}

fn open_store(dir: &Path) -> RecordStore {
    RecordStore::open(&StoreConfig {
        directory: dir.to_path_buf(),
        group: None,
    })
    .unwrap()
}

fn station(dir: &Path, name: &str) -> Attendance {
    Attendance::new(
        open_store(dir),
        StationId::new(name).unwrap(),
        LeaseConfig {
            timeout_ms: 5_000,
            stale_grace_ms: 60_000,
            retry_delay_ms: 5,
            retry_attempts: 5,
        },
        Profiles::default(),
    )
}

#[test]
fn concurrent_saves_with_same_fingerprint_yield_one_conflict() {
    let dir = tempfile::tempdir().unwrap();
    station(dir.path(), "setup")
        .enroll(&employee(), date(2025, 3, 1), 0, ts("2025-03-01T00:00:00+01:00"))
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["east", "west"]
        .into_iter()
        .map(|name| {
            let dir = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = open_store(&dir);
                let mut loaded = store.load(&employee()).unwrap();
                let scan = ScanEvent::new(employee(), ts("2025-03-03T08:00:00+01:00"));
                loaded.ledger.admit(scan, 0).unwrap();
                barrier.wait();
                store.save(
                    &mut loaded.ledger,
                    Some(&loaded.fingerprint),
                    &StationId::new(name).unwrap(),
                    Utc::now().fixed_offset(),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::Conflict { .. })))
        .count();
    assert_eq!((successes, conflicts), (1, 1));

    let saved = open_store(dir.path()).load(&employee()).unwrap().ledger;
    assert_eq!(saved.revision, 2);
    assert_eq!(saved.events.len(), 1);
}

#[test]
fn leased_cycles_from_many_stations_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    station(dir.path(), "setup")
        .enroll(&employee(), date(2025, 3, 1), 0, ts("2025-03-01T00:00:00+01:00"))
        .unwrap();

    let start = ts("2025-03-03T08:00:00+01:00");
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let dir = dir.path().to_path_buf();
            thread::spawn(move || {
                let svc = station(&dir, &format!("station-{i}"));
                let at = start + Duration::minutes(30 * i);
                svc.submit_event_with_retry(ScanEvent::new(employee(), at), at + Duration::hours(4))
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap().admission, Admission::Recorded);
    }

    let saved = open_store(dir.path()).load(&employee()).unwrap().ledger;
    assert_eq!(saved.events.len(), 4);
    assert_eq!(saved.revision, 5);
    assert!(!dir.path().join("042.ledger.lock").exists());
}

#[test]
fn abandoned_lease_is_reclaimed_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let svc = station(dir.path(), "front-desk");
    svc.enroll(&employee(), date(2025, 3, 1), 0, ts("2025-03-01T00:00:00+01:00"))
        .unwrap();

    let crashed = LeaseMarker {
        owner: StationId::new("back-office").unwrap(),
        token: uuid::Uuid::new_v4(),
        acquired_at: Utc::now() - Duration::minutes(30),
    };
    std::fs::write(
        dir.path().join("042.ledger.lock"),
        serde_json::to_string(&crashed).unwrap(),
    )
    .unwrap();

    let at = ts("2025-03-03T08:00:00+01:00");
    let submission = svc.submit_event(ScanEvent::new(employee(), at), at).unwrap();
    assert_eq!(submission.admission, Admission::Recorded);

    let saved = open_store(dir.path()).load(&employee()).unwrap().ledger;
    assert_eq!(saved.anomalies.len(), 1);
    assert_eq!(saved.anomalies[0].kind, DiagnosticKind::LeaseReclaimed);
    assert!(saved.anomalies[0].message.contains("back-office"));

    // Anomalies survive later cycles.
    let later = ts("2025-03-03T16:00:00+01:00");
    svc.submit_event(ScanEvent::new(employee(), later), later).unwrap();
    let saved = open_store(dir.path()).load(&employee()).unwrap().ledger;
    assert_eq!(saved.anomalies.len(), 1);
}

#[test]
fn fresh_lease_blocks_until_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let svc = station(dir.path(), "front-desk");
    svc.enroll(&employee(), date(2025, 3, 1), 0, ts("2025-03-01T00:00:00+01:00"))
        .unwrap();

    let store = open_store(dir.path());
    let _held = tc_store::lease::acquire(
        &store,
        &employee(),
        &StationId::new("back-office").unwrap(),
        &LeaseConfig::default(),
    )
    .unwrap();

    let impatient = Attendance::new(
        open_store(dir.path()),
        StationId::new("kiosk").unwrap(),
        LeaseConfig {
            timeout_ms: 50,
            stale_grace_ms: 60_000,
            retry_delay_ms: 5,
            retry_attempts: 1,
        },
        Profiles::default(),
    );
    let at = ts("2025-03-03T08:00:00+01:00");
    let err = impatient
        .submit_event_with_retry(ScanEvent::new(employee(), at), at)
        .unwrap_err();
    assert!(matches!(err, StoreError::LeaseTimeout { .. }));
    assert!(err.is_retryable());
}

#[test]
fn overnight_shift_and_carry_forward_survive_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let svc = station(dir.path(), "front-desk");
    svc.enroll(
        &employee(),
        date(2025, 1, 1),
        2 * 3_600_000,
        ts("2025-01-01T00:00:00+01:00"),
    )
    .unwrap();

    for (at, kind) in [
        ("2025-01-06T23:40:00+01:00", ClockAction::In),
        ("2025-01-07T00:20:00+01:00", ClockAction::Out),
    ] {
        svc.submit_event(ScanEvent::new(employee(), ts(at)).with_kind(kind), ts(at))
            .unwrap();
    }

    let as_of = ts("2025-03-31T23:00:00+02:00");
    let day = svc
        .get_day_record(&employee(), date(2025, 1, 6), as_of)
        .unwrap()
        .unwrap();
    assert_eq!(day.sessions.len(), 1);
    assert_eq!(day.sessions[0].duration_ms, 40 * 60_000);
    assert!(day.sessions[0].rollover);
    let next = svc
        .get_day_record(&employee(), date(2025, 1, 7), as_of)
        .unwrap()
        .unwrap();
    assert!(next.sessions.is_empty());

    let months: Vec<_> = (1..=3)
        .map(|month| {
            svc.get_period_balance(&employee(), PeriodId::Month { year: 2025, month }, as_of)
                .unwrap()
                .unwrap()
        })
        .collect();
    assert_eq!(months[0].opening_ms, 2 * 3_600_000);
    for pair in months.windows(2) {
        assert_eq!(pair[1].opening_ms, pair[0].closing_ms);
    }
    let year = svc
        .get_period_balance(&employee(), PeriodId::Year(2025), as_of)
        .unwrap()
        .unwrap();
    assert_eq!(year.closing_ms, months[2].closing_ms);
}
