use super::*;
use crate::clock::FixedClock;
use crate::service::Campsite;
use chrono::NaiveDate;
use ulid::Ulid;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn stay(arrival: &str, departure: &str) -> DateInterval {
    DateInterval::new(d(arrival), d(departure))
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("campsite_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Engine whose clock is pinned to 2024-06-01.
fn open_engine(name: &str) -> Engine {
    open_engine_at(test_wal_path(name), "2024-06-01")
}

fn open_engine_at(path: PathBuf, today: &str) -> Engine {
    Engine::open(path, Arc::new(FixedClock(d(today))), Duration::from_secs(2)).unwrap()
}

// ── Admission ────────────────────────────────────────────

#[tokio::test]
async fn create_then_get() {
    let engine = open_engine("create_get.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();

    let r = engine.get(id).await.unwrap();
    assert_eq!(r.owner_id, "alice");
    assert_eq!(r.interval, stay("2024-06-10", "2024-06-12"));
    assert!(engine.exists(id).await.unwrap());
    assert!(!engine.exists(Ulid::new()).await.unwrap());
}

#[tokio::test]
async fn create_rejects_overlap_and_names_holder() {
    let engine = open_engine("create_overlap.wal");
    let first = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();

    let err = engine.create("bob", stay("2024-06-11", "2024-06-13")).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(holder) if holder == first));
    assert_eq!(engine.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn departure_day_is_free_for_next_arrival() {
    let engine = open_engine("back_to_back.wal");
    engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    engine.create("bob", stay("2024-06-12", "2024-06-14")).await.unwrap();
    assert_eq!(engine.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn create_rejects_blank_owner() {
    let engine = open_engine("blank_owner.wal");
    let err = engine.create("   ", stay("2024-06-10", "2024-06-11")).await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));

    let long = "x".repeat(crate::limits::MAX_OWNER_ID_LEN + 1);
    let err = engine.create(&long, stay("2024-06-10", "2024-06-11")).await.unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_creates_admit_exactly_one() {
    let engine = Arc::new(open_engine("race.wal"));

    let n = 16;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.create(&format!("guest{i}"), stay("2024-06-10", "2024-06-13")).await
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(id) => winners.push(id),
            Err(EngineError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, n - 1);

    let live = engine.list().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_creates_all_succeed() {
    let engine = Arc::new(open_engine("disjoint.wal"));

    let mut handles = Vec::new();
    for day in 2..12u32 {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            let arrival = NaiveDate::from_ymd_opt(2024, 6, day * 2).unwrap();
            let departure = arrival.succ_opt().unwrap();
            eng.create("guest", DateInterval::new(arrival, departure)).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list().await.unwrap().len(), 10);
}

fn assert_disjoint(live: &[Reservation]) {
    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            assert!(!a.interval.overlaps(&b.interval), "{} overlaps {}", a.interval, b.interval);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_and_create_admit_exactly_one() {
    for round in 0..10 {
        let engine = Arc::new(open_engine(&format!("update_race_{round}.wal")));
        let bob = engine.create("bob", stay("2024-06-20", "2024-06-21")).await.unwrap();
        let carol = engine.create("carol", stay("2024-06-24", "2024-06-25")).await.unwrap();

        // Pairwise overlapping targets: [10,12), [11,13), [11,12).
        let move_bob = {
            let eng = engine.clone();
            tokio::spawn(async move { eng.update(bob, stay("2024-06-10", "2024-06-12")).await.map(|()| bob) })
        };
        let move_carol = {
            let eng = engine.clone();
            tokio::spawn(async move { eng.update(carol, stay("2024-06-11", "2024-06-13")).await.map(|()| carol) })
        };
        let add_dave = {
            let eng = engine.clone();
            tokio::spawn(async move { eng.create("dave", stay("2024-06-11", "2024-06-12")).await })
        };

        let mut winners = Vec::new();
        for h in [move_bob, move_carol, add_dave] {
            match h.await.unwrap() {
                Ok(id) => winners.push(id),
                Err(EngineError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners.len(), 1, "round {round}");

        let live = engine.list().await.unwrap();
        assert_disjoint(&live);
        let holders: Vec<_> = live
            .iter()
            .filter(|r| r.interval.occupies(d("2024-06-11")))
            .map(|r| r.id)
            .collect();
        assert_eq!(holders, winners);
        if winners[0] != bob {
            assert_eq!(engine.get(bob).await.unwrap().interval, stay("2024-06-20", "2024-06-21"));
        }
        if winners[0] != carol {
            assert_eq!(engine.get(carol).await.unwrap().interval, stay("2024-06-24", "2024-06-25"));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_onto_same_days_admit_exactly_one() {
    let engine = Arc::new(open_engine("update_pair_race.wal"));
    let mut ids = Vec::new();
    for day in [16u32, 18, 20, 22, 24, 26] {
        let arrival = NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        ids.push(engine.create("guest", DateInterval::new(arrival, arrival.succ_opt().unwrap())).await.unwrap());
    }

    let mut handles = Vec::new();
    for id in ids.clone() {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move { eng.update(id, stay("2024-06-05", "2024-06-07")).await }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => ok += 1,
            Err(EngineError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);

    let live = engine.list().await.unwrap();
    assert_eq!(live.len(), ids.len());
    assert_disjoint(&live);
}

// ── Update ───────────────────────────────────────────────

#[tokio::test]
async fn update_ignores_own_stay() {
    let engine = open_engine("update_self.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();

    engine.update(id, stay("2024-06-11", "2024-06-14")).await.unwrap();
    assert_eq!(engine.get(id).await.unwrap().interval, stay("2024-06-11", "2024-06-14"));
}

#[tokio::test]
async fn update_to_identical_stay_is_noop() {
    let engine = open_engine("update_same.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    let before = engine.wal_appends_since_compact().await;

    engine.update(id, stay("2024-06-10", "2024-06-12")).await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, before);
}

#[tokio::test]
async fn update_conflicts_with_other_reservation() {
    let engine = open_engine("update_conflict.wal");
    let a = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    let b = engine.create("bob", stay("2024-06-15", "2024-06-17")).await.unwrap();

    let err = engine.update(b, stay("2024-06-11", "2024-06-13")).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(holder) if holder == a));
    assert_eq!(engine.get(b).await.unwrap().interval, stay("2024-06-15", "2024-06-17"));
}

#[tokio::test]
async fn update_and_cancel_unknown_id() {
    let engine = open_engine("unknown_id.wal");
    let missing = Ulid::new();

    let err = engine.update(missing, stay("2024-06-10", "2024-06-11")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(id) if id == missing));
    let err = engine.cancel(missing).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    let err = engine.get(missing).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── Cancel ───────────────────────────────────────────────

#[tokio::test]
async fn cancel_frees_days() {
    let engine = open_engine("cancel_frees.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    engine.cancel(id).await.unwrap();

    assert!(!engine.exists(id).await.unwrap());
    let window = validation::validate_window(Some(d("2024-06-10")), Some(d("2024-06-11")), d("2024-06-01")).unwrap();
    let free: Vec<_> = engine.availability(&window).await.unwrap().collect();
    assert_eq!(free, vec![d("2024-06-10"), d("2024-06-11")]);

    engine.create("bob", stay("2024-06-10", "2024-06-12")).await.unwrap();
}

#[tokio::test]
async fn cancel_twice_is_not_found() {
    let engine = open_engine("cancel_twice.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    engine.cancel(id).await.unwrap();
    assert!(matches!(engine.cancel(id).await, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn cancel_past_rejected_ongoing_allowed() {
    let path = test_wal_path("cancel_past.wal");
    {
        let engine = open_engine_at(path.clone(), "2024-06-01");
        engine.create("past", stay("2024-06-05", "2024-06-07")).await.unwrap();
        engine.create("ongoing", stay("2024-06-09", "2024-06-11")).await.unwrap();
        engine.close().await.unwrap();
    }

    // Same ledger, seen on 2024-06-10.
    let engine = open_engine_at(path, "2024-06-10");
    let live = engine.list().await.unwrap();
    let past = live.iter().find(|r| r.owner_id == "past").unwrap().id;
    let ongoing = live.iter().find(|r| r.owner_id == "ongoing").unwrap().id;

    let err = engine.cancel(past).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert!(engine.exists(past).await.unwrap());

    engine.cancel(ongoing).await.unwrap();
    assert!(!engine.exists(ongoing).await.unwrap());
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn availability_excludes_occupied_days_only() {
    let engine = open_engine("availability.wal");
    engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();

    let window = validation::validate_window(Some(d("2024-06-10")), Some(d("2024-06-13")), d("2024-06-01")).unwrap();
    let free: Vec<_> = engine.availability(&window).await.unwrap().collect();
    assert_eq!(free, vec![d("2024-06-12"), d("2024-06-13")]);
}

#[tokio::test]
async fn availability_complements_occupied_days() {
    let engine = open_engine("complement.wal");
    engine.create("a", stay("2024-06-03", "2024-06-05")).await.unwrap();
    engine.create("b", stay("2024-06-08", "2024-06-11")).await.unwrap();
    engine.create("c", stay("2024-06-20", "2024-06-21")).await.unwrap();

    let window = validation::validate_window(None, None, d("2024-06-01")).unwrap();
    let span = window.as_interval();
    let free = engine.availability(&window).await.unwrap();
    let taken = free.taken().clone();
    let free: Vec<_> = free.collect();

    let occupied: Vec<_> = engine
        .find_intersecting(&span)
        .await
        .unwrap()
        .iter()
        .flat_map(|r| r.interval.days())
        .filter(|day| span.occupies(*day))
        .collect();
    assert_eq!(occupied.len(), taken.len());

    for day in span.days() {
        assert_ne!(free.contains(&day), taken.contains(&day), "{day}");
    }
    assert!(free.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn find_intersecting_uses_occupied_days() {
    let engine = open_engine("intersecting.wal");
    let a = engine.create("a", stay("2024-06-10", "2024-06-12")).await.unwrap();
    engine.create("b", stay("2024-06-14", "2024-06-15")).await.unwrap();

    let hits = engine.find_intersecting(&stay("2024-06-11", "2024-06-14")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, a);

    // Touching the departure day is not an intersection.
    assert!(engine.find_intersecting(&stay("2024-06-12", "2024-06-14")).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_is_in_arrival_order() {
    let engine = open_engine("list_order.wal");
    engine.create("c", stay("2024-06-20", "2024-06-21")).await.unwrap();
    engine.create("a", stay("2024-06-05", "2024-06-06")).await.unwrap();
    engine.create("b", stay("2024-06-10", "2024-06-11")).await.unwrap();

    let owners: Vec<_> = engine.list().await.unwrap().into_iter().map(|r| r.owner_id).collect();
    assert_eq!(owners, vec!["a", "b", "c"]);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_committed_set() {
    let path = test_wal_path("replay.wal");
    let (kept, moved) = {
        let engine = open_engine_at(path.clone(), "2024-06-01");
        let kept = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
        let moved = engine.create("bob", stay("2024-06-14", "2024-06-15")).await.unwrap();
        let gone = engine.create("carol", stay("2024-06-20", "2024-06-22")).await.unwrap();
        engine.update(moved, stay("2024-06-16", "2024-06-19")).await.unwrap();
        engine.cancel(gone).await.unwrap();
        engine.close().await.unwrap();
        (kept, moved)
    };

    let engine = open_engine_at(path, "2024-06-01");
    let live = engine.list().await.unwrap();
    assert_eq!(live.len(), 2);
    assert_eq!(engine.get(kept).await.unwrap().interval, stay("2024-06-10", "2024-06-12"));
    assert_eq!(engine.get(moved).await.unwrap().interval, stay("2024-06-16", "2024-06-19"));

    let err = engine.create("dave", stay("2024-06-17", "2024-06-18")).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(holder) if holder == moved));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact.wal");
    {
        let engine = open_engine_at(path.clone(), "2024-06-01");
        for day in 10..16u32 {
            let arrival = NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
            let id = engine
                .create("temp", DateInterval::new(arrival, arrival.succ_opt().unwrap()))
                .await
                .unwrap();
            engine.cancel(id).await.unwrap();
        }
        engine.create("alice", stay("2024-06-20", "2024-06-22")).await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 13);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        engine.create("bob", stay("2024-06-25", "2024-06-26")).await.unwrap();
        engine.close().await.unwrap();
    }

    let engine = open_engine_at(path, "2024-06-01");
    let owners: Vec<_> = engine.list().await.unwrap().into_iter().map(|r| r.owner_id).collect();
    assert_eq!(owners, vec!["alice", "bob"]);
}

#[tokio::test]
async fn replay_skips_record_overlapping_rebuilt_set() {
    let path = test_wal_path("replay_overlap.wal");
    let first = Ulid::new();
    let second = Ulid::new();
    {
        let mut wal = Wal::open(&path).unwrap();
        for (id, owner) in [(first, "failed-earlier"), (second, "admitted-later")] {
            wal.append(&Event::ReservationCreated {
                id,
                owner_id: owner.into(),
                interval: stay("2024-06-10", "2024-06-12"),
            })
            .unwrap();
        }
        wal.append(&Event::ReservationRescheduled { id: second, interval: stay("2024-06-11", "2024-06-13") })
            .unwrap();
    }

    let engine = open_engine_at(path, "2024-06-01");
    let live = engine.list().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, first);
    assert_eq!(live[0].interval, stay("2024-06-10", "2024-06-12"));
}

#[tokio::test]
async fn concurrent_appends_all_replay() {
    let path = test_wal_path("concurrent_appends.wal");
    let engine = Arc::new(open_engine_at(path.clone(), "2024-06-01"));

    let mut handles = Vec::new();
    for day in 2..22u32 {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            let arrival = NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
            eng.create("guest", DateInterval::new(arrival, arrival.succ_opt().unwrap()))
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list().await.unwrap().len(), 20);
    engine.close().await.unwrap();

    let engine2 = open_engine_at(path, "2024-06-01");
    assert_eq!(engine2.list().await.unwrap().len(), 20);
}

#[tokio::test]
async fn mutations_after_close_are_storage_failures() {
    let engine = open_engine("closed.wal");
    let id = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
    engine.close().await.unwrap();

    let err = engine.create("bob", stay("2024-06-20", "2024-06-21")).await.unwrap_err();
    assert!(matches!(err, EngineError::StorageFailure { .. }));
    // Nothing was applied.
    assert_eq!(engine.list().await.unwrap().len(), 1);
    assert!(matches!(engine.cancel(id).await, Err(EngineError::StorageFailure { .. })));
    assert!(engine.exists(id).await.unwrap());
}

// ── Lock timeout ─────────────────────────────────────────

#[tokio::test]
async fn held_write_guard_turns_into_busy() {
    let engine = Engine::open(
        test_wal_path("busy.wal"),
        Arc::new(FixedClock(d("2024-06-01"))),
        Duration::from_millis(50),
    )
    .unwrap();

    let guard = engine.write_state().await.unwrap();
    let err = engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap_err();
    assert!(matches!(err, EngineError::Busy));
    assert!(matches!(engine.list().await, Err(EngineError::Busy)));
    drop(guard);

    engine.create("alice", stay("2024-06-10", "2024-06-12")).await.unwrap();
}

// ── Service (string inputs) ──────────────────────────────

fn campsite(name: &str) -> Campsite {
    Campsite::new(Arc::new(open_engine(name)))
}

#[tokio::test]
async fn service_rejects_four_night_stay() {
    let site = campsite("svc_four_nights.wal");
    let err = site
        .create_reservation("alice", Some("2024-06-10"), Some("2024-06-14"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidRange(RangeViolation::StayTooLong { nights: 4, .. })
    ));
    assert!(site.reservations().await.unwrap().is_empty());

    site.create_reservation("alice", Some("2024-06-10"), Some("2024-06-13"))
        .await
        .unwrap();
}

#[tokio::test]
async fn service_lead_time_boundary() {
    let site = campsite("svc_lead_time.wal");
    let err = site
        .create_reservation("alice", Some("2024-06-01"), Some("2024-06-02"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidRange(RangeViolation::InsufficientLeadTime { .. })
    ));
    site.create_reservation("alice", Some("2024-06-02"), Some("2024-06-03"))
        .await
        .unwrap();
}

#[tokio::test]
async fn service_horizon_boundary() {
    let site = campsite("svc_horizon.wal");
    site.create_reservation("alice", Some("2024-06-29"), Some("2024-07-01"))
        .await
        .unwrap();
    let err = site
        .create_reservation("bob", Some("2024-06-30"), Some("2024-07-02"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidRange(RangeViolation::BeyondHorizon { .. })
    ));
}

#[tokio::test]
async fn service_rejects_missing_and_malformed_dates() {
    let site = campsite("svc_malformed.wal");
    let err = site.create_reservation("alice", None, Some("2024-06-12")).await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));
    let err = site
        .create_reservation("alice", Some("June 10"), Some("2024-06-12"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));
}

#[tokio::test]
async fn service_update_validates_before_lookup() {
    let site = campsite("svc_update.wal");
    let err = site
        .update_reservation(Ulid::new(), Some("2024-06-10"), Some("2024-06-20"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange(_)));

    let err = site
        .update_reservation(Ulid::new(), Some("2024-06-10"), Some("2024-06-11"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn service_availability_defaults() {
    let site = campsite("svc_defaults.wal");
    let id = site
        .create_reservation("alice", Some("2024-06-10"), Some("2024-06-12"))
        .await
        .unwrap();

    // 2024-06-02 through 2024-07-01, minus 10th and 11th.
    let free = site.check_availability(None, None).await.unwrap();
    assert_eq!(free.first(), Some(&d("2024-06-02")));
    assert_eq!(free.last(), Some(&d("2024-07-01")));
    assert_eq!(free.len(), 30 - 2);
    assert!(!free.contains(&d("2024-06-10")));
    assert!(free.contains(&d("2024-06-12")));

    site.cancel_reservation(id).await.unwrap();
    let free = site.check_availability(Some(""), Some("")).await.unwrap();
    assert_eq!(free.len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_concurrent_overlapping_pair() {
    let engine = open_engine_at(test_wal_path("svc_pair.wal"), "2024-06-20");
    let site = Campsite::new(Arc::new(engine));

    let (a, b) = tokio::join!(
        {
            let site = site.clone();
            async move { site.create_reservation("alice", Some("2024-07-01"), Some("2024-07-02")).await }
        },
        {
            let site = site.clone();
            async move { site.create_reservation("bob", Some("2024-07-01"), Some("2024-07-03")).await }
        },
    );

    let (winner, loser) = match (a, b) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        other => panic!("expected one success and one conflict, got {other:?}"),
    };
    assert!(matches!(loser, EngineError::Conflict(holder) if holder == winner));
    assert_eq!(site.reservations().await.unwrap().len(), 1);
}
