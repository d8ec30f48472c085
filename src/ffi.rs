//! FFI bindings for mobile platforms (iOS/Android).
//!
//! One process-wide tracker lives behind a mutex and is driven by exported
//! free functions. The host owns the platform location APIs: it starts and
//! stops them through [`LocationProvider`] and forwards every fix with
//! [`tracker_push_sample`]. Timers are driven from the host by calling
//! [`tracker_tick`] about once a second.
//!
//! Fixes are queued without holding the tracker lock, so a provider may call
//! [`tracker_push_sample`] from inside its callbacks. A fix pushed while the
//! tracker is busy is processed on the next push or tick.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use log::{debug, info, warn};

use crate::config::TrackerSettings;
use crate::error::{Result, TrackerError};
use crate::geo_utils::{format_distance, format_duration, format_speed};
use crate::init_logging;
use crate::location::{LocationSource, PushLocationSource, SampleSink, SubscriptionHandle};
use crate::persistence::SqliteTripStore;
use crate::track::TripTrack;
use crate::tracker::{TrackerContext, TripTracker};
use crate::types::{GpsHealth, RawSample, TripId};

/// Platform location updates, implemented in Kotlin/Swift.
///
/// Both callbacks run while the tracker lock is held. They may push fixes
/// but must not call any other tracker export.
#[uniffi::export(callback_interface)]
pub trait LocationProvider: Send + Sync {
    /// Begin delivering fixes. Return false if permission is missing or
    /// location services are off.
    fn start_updates(&self) -> bool;

    fn stop_updates(&self);
}

/// A fix as delivered by the platform.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Device-reported speed in m/s
    pub speed_mps: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp_ms: i64,
}

impl From<FfiSample> for RawSample {
    fn from(s: FfiSample) -> Self {
        RawSample {
            latitude: s.latitude,
            longitude: s.longitude,
            instant_speed: s.speed_mps,
            altitude: s.altitude,
            horizontal_accuracy: s.accuracy,
            captured_at_ms: s.timestamp_ms,
        }
    }
}

/// Live metrics plus strings formatted in the user's units.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMetrics {
    pub state: String,
    pub trip_id: Option<i64>,
    pub speed_kmh: f64,
    pub total_distance_meters: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub elapsed_seconds: u64,
    pub gps_health: String,
    pub accuracy: Option<f64>,
    pub auto_paused: bool,
    pub speed_text: String,
    pub distance_text: String,
    pub avg_speed_text: String,
    pub duration_text: String,
}

// ============================================================================
// Provider-backed location source
// ============================================================================

/// Bridges the host's start/stop callbacks to the push-based sink.
struct ProviderLocationSource {
    provider: Box<dyn LocationProvider>,
    feed: PushLocationSource,
}

impl LocationSource for ProviderLocationSource {
    fn subscribe(&mut self, sink: SampleSink) -> Result<SubscriptionHandle> {
        // Subscribe first so fixes pushed from inside start_updates are kept
        let handle = self.feed.subscribe(sink)?;
        if !self.provider.start_updates() {
            self.feed.unsubscribe(handle);
            return Err(TrackerError::location(
                "location permission denied or services disabled",
            ));
        }
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.feed.unsubscribe(handle);
        self.provider.stop_updates();
    }
}

// ============================================================================
// Global Tracker
// ============================================================================

static TRACKER: Mutex<Option<TripTracker>> = Mutex::new(None);

/// Host-side handle of the tracker's location feed. Kept outside [`TRACKER`]
/// so pushing never waits on the tracker lock.
static FEED: Mutex<Option<PushLocationSource>> = Mutex::new(None);

fn lock_tracker() -> MutexGuard<'static, Option<TripTracker>> {
    TRACKER.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_feed() -> Option<PushLocationSource> {
    FEED.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Run `f` against the tracker. Returns `None` before [`tracker_init`].
fn with_tracker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut TripTracker) -> R,
{
    let mut guard = lock_tracker();
    match guard.as_mut() {
        Some(tracker) => Some(f(tracker)),
        None => {
            warn!("[TripTracker] Called before tracker_init");
            None
        }
    }
}

fn log_failure<T>(action: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[TripTracker] {} failed: {}", action, e);
            None
        }
    }
}

fn health_label(health: GpsHealth) -> &'static str {
    match health {
        GpsHealth::Searching => "searching",
        GpsHealth::Acquired => "acquired",
        GpsHealth::Lost => "lost",
    }
}

// ============================================================================
// FFI Exports
// ============================================================================

/// Open (or create) the trip database and install the global tracker.
///
/// An empty `settings_json` uses defaults. Replaces any previous tracker.
#[uniffi::export]
pub fn tracker_init(
    db_path: String,
    settings_json: String,
    provider: Box<dyn LocationProvider>,
) -> bool {
    init_logging();

    let settings = if settings_json.trim().is_empty() {
        TrackerSettings::default()
    } else {
        match TrackerSettings::from_json(&settings_json) {
            Ok(s) => s,
            Err(e) => {
                warn!("[TripTracker] Invalid settings, using defaults: {}", e);
                TrackerSettings::default()
            }
        }
    };

    let Some(store) = log_failure("Opening database", SqliteTripStore::open(&db_path)) else {
        return false;
    };

    let feed = PushLocationSource::new();
    let source = ProviderLocationSource {
        provider,
        feed: feed.clone(),
    };
    let tracker = TripTracker::new(TrackerContext::new(store, source).with_settings(settings));

    *lock_tracker() = Some(tracker);
    *FEED.lock().unwrap_or_else(PoisonError::into_inner) = Some(feed);
    info!("[TripTracker] Initialized with {}", db_path);
    true
}

/// Resume a trip left unfinished by a previous process.
/// Returns the trip as JSON, or an empty string if there was none.
#[uniffi::export]
pub fn tracker_recover() -> String {
    with_tracker(|t| {
        log_failure("Recovery", t.recover())
            .flatten()
            .and_then(|trip| serde_json::to_string(&trip).ok())
    })
    .flatten()
    .unwrap_or_default()
}

/// Start a new trip. Returns its id, or `None` on failure.
#[uniffi::export]
pub fn tracker_start() -> Option<i64> {
    with_tracker(|t| log_failure("Start", t.start()).map(|id| id.0)).flatten()
}

/// Stop the current trip. Returns the final summary as JSON, or an empty
/// string if nothing was being tracked.
#[uniffi::export]
pub fn tracker_stop() -> String {
    with_tracker(|t| {
        log_failure("Stop", t.stop()).and_then(|trip| serde_json::to_string(&trip).ok())
    })
    .flatten()
    .unwrap_or_default()
}

#[uniffi::export]
pub fn tracker_pause() -> bool {
    with_tracker(|t| log_failure("Pause", t.pause()).is_some()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_resume() -> bool {
    with_tracker(|t| log_failure("Resume", t.resume()).is_some()).unwrap_or(false)
}

/// Forward one platform fix. It is processed immediately unless the tracker
/// is busy, e.g. when called from a [`LocationProvider`] callback.
#[uniffi::export]
pub fn tracker_push_sample(sample: FfiSample) {
    let Some(feed) = current_feed() else {
        warn!("[TripTracker] Called before tracker_init");
        return;
    };
    feed.push(sample.into());

    let mut guard = match TRACKER.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(e)) => e.into_inner(),
        Err(TryLockError::WouldBlock) => {
            debug!("[TripTracker] Tracker busy, fix left queued");
            return;
        }
    };
    if let Some(tracker) = guard.as_mut() {
        tracker.drain_samples();
    }
}

/// Drive timers: speed decay, the auto-pause deadline and the loss watchdog.
/// Also processes any fixes still queued.
#[uniffi::export]
pub fn tracker_tick() {
    with_tracker(|t| {
        t.drain_samples();
        t.on_decay_tick();
        t.poll_auto_pause();
        t.on_health_tick();
    });
}

/// Current metrics. Idle metrics before [`tracker_init`].
#[uniffi::export]
pub fn tracker_metrics() -> FfiMetrics {
    let (metrics, units) = with_tracker(|t| (t.snapshot(), t.settings().units))
        .unwrap_or_default();

    FfiMetrics {
        state: metrics.state.as_str().to_string(),
        trip_id: metrics.trip_id.map(|id| id.0),
        speed_kmh: metrics.speed_kmh,
        total_distance_meters: metrics.total_distance_meters,
        avg_speed_kmh: metrics.avg_speed_kmh,
        max_speed_kmh: metrics.max_speed_kmh,
        elapsed_seconds: metrics.elapsed_seconds,
        gps_health: health_label(metrics.gps_health).to_string(),
        accuracy: metrics.accuracy,
        auto_paused: metrics.auto_paused,
        speed_text: format_speed(metrics.speed_kmh, units),
        distance_text: format_distance(metrics.total_distance_meters, units),
        avg_speed_text: format_speed(metrics.avg_speed_kmh, units),
        duration_text: format_duration(metrics.elapsed_seconds),
    }
}

/// Replace settings from JSON. Returns false if the JSON is invalid.
#[uniffi::export]
pub fn tracker_update_settings(settings_json: String) -> bool {
    let Some(settings) = log_failure(
        "Parsing settings",
        TrackerSettings::from_json(&settings_json),
    ) else {
        return false;
    };
    with_tracker(|t| t.update_settings(settings)).is_some()
}

/// All stored trips as a JSON array, newest first.
#[uniffi::export]
pub fn tracker_list_trips_json() -> String {
    with_tracker(|t| log_failure("Listing trips", t.store().list_trips()))
        .flatten()
        .and_then(|trips| serde_json::to_string(&trips).ok())
        .unwrap_or_else(|| "[]".to_string())
}

/// Simplified track for a trip as JSON, or an empty string if it has no points.
#[uniffi::export]
pub fn tracker_trip_track_json(trip_id: i64) -> String {
    with_tracker(|t| {
        log_failure(
            "Loading track",
            TripTrack::load(t.store(), TripId(trip_id), TripTrack::DEFAULT_TOLERANCE),
        )
    })
    .flatten()
    .flatten()
    .and_then(|track| serde_json::to_string(&track).ok())
    .unwrap_or_default()
}

/// Delete a trip and its points. The trip being tracked cannot be deleted.
#[uniffi::export]
pub fn tracker_delete_trip(trip_id: i64) -> bool {
    let id = TripId(trip_id);
    with_tracker(|t| {
        if t.session().map(|session| session.trip_id()) == Some(id) {
            warn!("[TripTracker] Refusing to delete trip {} while tracking it", id);
            return false;
        }
        log_failure("Deleting trip", t.store_mut().delete_trip(id)).unwrap_or(false)
    })
    .unwrap_or(false)
}
