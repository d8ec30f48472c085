//! SQLite-backed tracker integration tests.
//!
//! Drives a full trip through the tracker with a file-backed store, then
//! reopens the database the way the app does after being killed mid-trip.
//!
//! Run with: `cargo test --test sqlite_store`

use tempfile::TempDir;
use trip_tracker::{
    load_history_entry, GpsHealth, ManualClock, PushLocationSource, RawSample, SqliteTripStore,
    TrackerContext, TrackerState, TripId, TripStatus, TripStore, TripTrack, TripTracker,
    TripUpdate,
};

const T0: i64 = 1_700_000_000_000;

/// Helper: tracker over a SQLite file in `dir`, sharing `clock` and `gps`.
fn open_tracker(dir: &TempDir, clock: &ManualClock, gps: &PushLocationSource) -> TripTracker {
    let db_path = dir.path().join("trips.db");
    let store =
        SqliteTripStore::open(db_path.to_str().unwrap()).expect("failed to open trip database");
    TripTracker::new(TrackerContext::new(store, gps.clone()).with_clock(clock.clone()))
}

fn reopen_store(dir: &TempDir) -> SqliteTripStore {
    let db_path = dir.path().join("trips.db");
    SqliteTripStore::open(db_path.to_str().unwrap()).expect("failed to reopen trip database")
}

/// Helper: walk north in 0.001 degree steps (~111 m) every 10 s at 4 m/s.
fn walk(tracker: &mut TripTracker, clock: &ManualClock, gps: &PushLocationSource, steps: usize) {
    for i in 0..steps {
        let t = T0 + i as i64 * 10_000;
        clock.set(t);
        gps.push(RawSample::new(51.5 + i as f64 * 0.001, -0.12, t).with_speed(4.0));
        tracker.drain_samples();
    }
}

// ============================================================================
// Test: Crash Recovery
// ============================================================================

#[test]
fn test_trip_survives_process_restart() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();

    let mut tracker = open_tracker(&tmp, &clock, &gps);
    let trip_id = tracker.start().unwrap();
    walk(&mut tracker, &clock, &gps, 5);

    let before = tracker.snapshot();
    assert!(
        (before.total_distance_meters - 444.8).abs() < 1.0,
        "Expected ~444.8m, got {}",
        before.total_distance_meters
    );

    // Process killed without stop()
    drop(tracker);
    clock.set(T0 + 600_000);

    let mut tracker = open_tracker(&tmp, &clock, &gps);
    let recovered = tracker.recover().unwrap().expect("open trip should be recovered");
    assert_eq!(recovered.id, trip_id);
    assert_eq!(tracker.state(), TrackerState::Active);
    assert!((recovered.total_distance_meters - before.total_distance_meters).abs() < 1e-9);
    assert!((recovered.max_speed_kmh - 14.4).abs() < 1e-9);

    // Average over wall-clock time: km / (600 s in hours)
    let expected_avg = (before.total_distance_meters / 1000.0) / (600.0 / 3600.0);
    assert!((recovered.avg_speed_kmh - expected_avg).abs() < 1e-9);

    let points = tracker.store().get_points_for_trip(trip_id).unwrap();
    assert_eq!(points.len(), 5);
    assert!(points.windows(2).all(|w| w[0].captured_at_ms < w[1].captured_at_ms));

    clock.set(T0 + 660_000);
    let summary = tracker.stop().unwrap();
    assert_eq!(summary.status, TripStatus::Completed);
    drop(tracker);

    let store = reopen_store(&tmp);
    assert!(store.get_active_trip().unwrap().is_none());
    let stored = store.get_trip(trip_id).unwrap().unwrap();
    assert_eq!(stored.status, TripStatus::Completed);
    assert_eq!(stored.ended_at_ms, Some(T0 + 660_000));
    assert!((stored.total_distance_meters - summary.total_distance_meters).abs() < 1e-9);
}

#[test]
fn test_paused_trip_recovers_as_active() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();

    let trip_id = {
        let mut store = reopen_store(&tmp);
        let id = store.create_trip(T0).unwrap();
        store
            .update_trip_aggregate(id, &TripUpdate::status(TripStatus::Paused))
            .unwrap();
        id
    };

    clock.set(T0 + 60_000);
    let mut tracker = open_tracker(&tmp, &clock, &gps);
    let trip = tracker.recover().unwrap().unwrap();
    assert_eq!(trip.id, trip_id);
    assert_eq!(trip.status, TripStatus::Active);
    assert_eq!(tracker.state(), TrackerState::Active);
    assert_eq!(
        tracker.store().get_trip(trip_id).unwrap().unwrap().status,
        TripStatus::Active
    );
    assert_eq!(tracker.snapshot().elapsed_seconds, 60);
}

#[test]
fn test_recovery_without_location_access() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();

    let mut tracker = open_tracker(&tmp, &clock, &gps);
    tracker.start().unwrap();
    drop(tracker);

    gps.set_available(false, "permission revoked");
    let mut tracker = open_tracker(&tmp, &clock, &gps);
    assert!(tracker.recover().unwrap().is_some());

    let session = tracker.session().unwrap();
    assert!(!session.is_subscribed());
    assert_eq!(session.gps_health(), GpsHealth::Searching);

    clock.advance(15_000);
    tracker.on_health_tick();
    assert_eq!(tracker.snapshot().gps_health, GpsHealth::Lost);
}

#[test]
fn test_nothing_to_recover() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();

    let mut tracker = open_tracker(&tmp, &clock, &gps);
    assert!(tracker.recover().unwrap().is_none());
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert!(!gps.is_subscribed());
}

// ============================================================================
// Test: History
// ============================================================================

#[test]
fn test_history_and_delete() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();

    let mut tracker = open_tracker(&tmp, &clock, &gps);
    let first = tracker.start().unwrap();
    walk(&mut tracker, &clock, &gps, 4);
    tracker.stop().unwrap();

    clock.advance(3_600_000);
    let second = tracker.start().unwrap();
    tracker.stop().unwrap();
    drop(tracker);

    let mut store = reopen_store(&tmp);
    let ids: Vec<TripId> = store.list_trips().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![second, first]);

    let entry = load_history_entry(&store, first, TripTrack::DEFAULT_TOLERANCE).unwrap();
    let track = entry.track.expect("walked trip should have a track");
    assert_eq!(track.source_point_count, 4);
    // Straight line north collapses to its endpoints
    assert_eq!(track.points.len(), 2);
    assert!((track.path_length_meters - entry.trip.total_distance_meters).abs() < 1e-6);

    assert!(load_history_entry(&store, second, TripTrack::DEFAULT_TOLERANCE)
        .unwrap()
        .track
        .is_none());

    assert!(store.delete_trip(first).unwrap());
    assert_eq!(store.point_count(first).unwrap(), 0);
    assert_eq!(store.list_trips().unwrap().len(), 1);
}
