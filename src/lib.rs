//! # Trip Tracker
//!
//! Real-time GPS trip tracking core for mobile apps.
//!
//! This library provides:
//! - Speed and distance estimation from raw location fixes
//! - A tracking state machine with pause, auto-pause and GPS-loss detection
//! - Crash recovery of an interrupted trip from durable storage
//! - Trip history with simplified tracks for map rendering
//!
//! ## Features
//!
//! - **`persistence`** - SQLite trip store (enabled by default)
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trip_tracker::{
//!     MemoryTripStore, PushLocationSource, RawSample, TrackerContext, TripTracker,
//! };
//!
//! let gps = PushLocationSource::new();
//! let mut tracker = TripTracker::new(TrackerContext::new(MemoryTripStore::new(), gps.clone()));
//!
//! let trip_id = tracker.start().unwrap();
//! let now = tracker.now_ms();
//! gps.push(RawSample::new(51.5074, -0.1278, now).with_speed(5.0));
//! gps.push(RawSample::new(51.5084, -0.1278, now + 10_000).with_speed(5.0));
//! tracker.drain_samples();
//!
//! let metrics = tracker.snapshot();
//! assert_eq!(metrics.trip_id, Some(trip_id));
//! assert!(metrics.total_distance_meters > 100.0);
//!
//! let summary = tracker.stop().unwrap();
//! println!("{:.0} m at {:.1} km/h", summary.total_distance_meters, summary.max_speed_kmh);
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, TrackerError};

// Core data model
pub mod types;
pub use types::{
    GpsHealth, LiveMetrics, ProcessedPoint, RawSample, TrackerState, TripAggregate, TripId,
    TripStatus, TripUpdate,
};

// Geographic utilities (distance, unit conversion, formatting)
pub mod geo_utils;

// User settings
pub mod config;
pub use config::{TrackerSettings, UnitSystem};

// Time source
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// Per-fix speed and distance estimation
pub mod processor;
pub use processor::{SampleEstimate, SampleProcessor};

// Running trip totals
pub mod aggregate;

// Location source boundary
pub mod location;
pub use location::{LocationSource, PushLocationSource, SampleSink, SubscriptionHandle};

// Persistence gateway boundary
pub mod store;
pub use store::{MemoryTripStore, TripStore};

// SQLite trip store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteTripStore;

// Historical trip view
pub mod track;
pub use track::{load_history_entry, Bounds, TripHistoryEntry, TripTrack};

// Tracking state machine
pub mod tracker;
pub use tracker::{SampleOutcome, TrackerContext, TrackingSession, TripTracker};

// Async event loop driving the tracker
pub mod service;
pub use service::{TrackingHandle, TrackingService};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android. No-op on other platforms.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TripTracker"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // No-op on non-Android platforms
}
