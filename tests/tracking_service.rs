//! Tracking service integration tests.
//!
//! Runs the tracker on its tokio event loop with paused time, so the decay,
//! health and auto-pause timers fire deterministically.

use std::time::Duration;

use trip_tracker::{
    GpsHealth, ManualClock, MemoryTripStore, PushLocationSource, RawSample, TrackerContext,
    TrackerError, TrackerSettings, TrackerState, TrackingHandle, TrackingService, TripStatus,
    TripStore, TripTracker,
};

const T0: i64 = 1_700_000_000_000;

struct Fixture {
    handle: TrackingHandle,
    clock: ManualClock,
    gps: PushLocationSource,
    store: MemoryTripStore,
}

fn spawn(settings: TrackerSettings) -> Fixture {
    let clock = ManualClock::new(T0);
    let gps = PushLocationSource::new();
    let store = MemoryTripStore::new();
    let context = TrackerContext::new(store.clone(), gps.clone())
        .with_clock(clock.clone())
        .with_settings(settings);
    let handle = TrackingService::spawn(TripTracker::new(context)).expect("spawn service");
    Fixture {
        handle,
        clock,
        gps,
        store,
    }
}

impl Fixture {
    /// Push a fix at `offset_ms` and wait until the loop has processed it.
    async fn fix(&self, offset_ms: i64, lat: f64, kmh: f64) {
        self.clock.set(T0 + offset_ms);
        self.gps
            .push(RawSample::new(lat, -0.12, T0 + offset_ms).with_speed(kmh / 3.6));
        // Let the loop pick up the fix, then round-trip a command
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.handle.snapshot().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_trip_through_service() {
    let f = spawn(TrackerSettings::default());
    assert_eq!(f.handle.metrics().state, TrackerState::Idle);

    let trip_id = f.handle.start().await.unwrap();
    f.fix(1_000, 51.5, 12.0).await;
    f.fix(11_000, 51.501, 12.0).await;

    let m = f.handle.snapshot().await.unwrap();
    assert_eq!(m.trip_id, Some(trip_id));
    assert_eq!(m.gps_health, GpsHealth::Acquired);
    assert!((m.total_distance_meters - 111.2).abs() < 0.5);
    assert_eq!(f.handle.metrics(), m);

    f.handle.pause().await.unwrap();
    assert!(matches!(
        f.handle.pause().await,
        Err(TrackerError::InvalidTransition { .. })
    ));
    f.handle.resume().await.unwrap();

    let summary = f.handle.stop().await.unwrap();
    assert_eq!(summary.status, TripStatus::Completed);
    assert_eq!(
        f.store.get_trip(trip_id).unwrap().unwrap().status,
        TripStatus::Completed
    );
    assert!(!f.gps.is_subscribed());

    let tracker = f.handle.shutdown().await.unwrap();
    assert_eq!(tracker.state(), TrackerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_health_tick_marks_gps_lost() {
    let f = spawn(TrackerSettings::default());
    f.handle.start().await.unwrap();
    f.fix(0, 51.5, 12.0).await;

    f.clock.advance(11_000);
    // Next 5 s health tick sees 11 s of silence
    tokio::time::sleep(Duration::from_secs(6)).await;

    let m = f.handle.snapshot().await.unwrap();
    assert_eq!(m.gps_health, GpsHealth::Lost);
    // The decay tick has also dropped the stale speed
    assert_eq!(m.speed_kmh, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_pause_deadline_fires() {
    let settings = TrackerSettings {
        auto_pause_enabled: true,
        auto_pause_speed: 2.0,
        auto_pause_delay_ms: 5_000,
        ..TrackerSettings::default()
    };
    let f = spawn(settings);
    f.handle.start().await.unwrap();
    f.fix(0, 51.5, 12.0).await;
    f.fix(1_000, 51.5, 1.5).await;
    assert_eq!(f.handle.metrics().state, TrackerState::Active);

    f.clock.advance(5_000);
    let mut metrics = f.handle.subscribe_metrics();
    tokio::time::timeout(
        Duration::from_secs(10),
        metrics.wait_for(|m| m.state == TrackerState::Paused),
    )
    .await
    .expect("auto-pause should fire")
    .unwrap();
    assert!(f.handle.metrics().auto_paused);

    // Moving again resumes without user action
    f.fix(7_000, 51.5005, 12.0).await;
    let m = f.handle.snapshot().await.unwrap();
    assert_eq!(m.state, TrackerState::Active);
    assert!(!m.auto_paused);
}

#[tokio::test(start_paused = true)]
async fn test_location_denied_start_stays_idle() {
    let f = spawn(TrackerSettings::default());
    f.gps.set_available(false, "permission denied");

    let err = f.handle.start().await.unwrap_err();
    assert!(matches!(err, TrackerError::LocationUnavailable { .. }));
    assert_eq!(f.handle.snapshot().await.unwrap().state, TrackerState::Idle);
    assert!(f.store.list_trips().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handle_after_shutdown() {
    let f = spawn(TrackerSettings::default());
    let subscriber = f.handle.subscribe_metrics();
    f.handle.shutdown().await.unwrap();
    assert!(subscriber.has_changed().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_extreme_settings_keep_loop_running() {
    let settings = TrackerSettings {
        auto_pause_enabled: true,
        auto_pause_delay_ms: u64::MAX,
        decay_check_interval_ms: u64::MAX,
        health_check_interval_ms: u64::MAX,
        ..TrackerSettings::default()
    };
    let f = spawn(settings);
    f.handle.start().await.unwrap();
    f.fix(0, 51.5, 0.0).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    let m = f.handle.snapshot().await.unwrap();
    assert_eq!(m.state, TrackerState::Active);
    assert_eq!(m.gps_health, GpsHealth::Acquired);
}
