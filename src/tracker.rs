//! # Tracking State Machine
//!
//! Owns the live trip: lifecycle (`Idle → Active ⇄ Paused → Idle`, with the
//! trip itself ending up `Completed`), GPS health, speed decay, auto-pause and
//! recovery of an interrupted trip after a process restart.
//!
//! ## Architecture
//!
//! The tracker is an owned object built from a [`TrackerContext`] (store,
//! location source, clock, settings). There is no global state. Every read of
//! the live session goes through the single [`TrackingSession`] held here, so
//! callbacks always observe the latest accepted state.
//!
//! Timers are explicit: the driver calls [`TripTracker::on_decay_tick`] (~1 Hz),
//! [`TripTracker::on_health_tick`] (~5 s) and
//! [`TripTracker::poll_auto_pause`] at [`TripTracker::auto_pause_deadline_ms`].
//! See [`crate::service`] for the tokio driver.
//!
//! ## Failure semantics
//!
//! - Location source failure on `start` leaves the tracker Idle.
//! - Store write failures while tracking are logged and swallowed. The
//!   in-memory aggregate stays authoritative.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::config::{clock_millis, TrackerSettings};
use crate::error::{Result, TrackerError};
use crate::location::{LocationSource, SampleSink, SubscriptionHandle};
use crate::processor::{SampleEstimate, SampleProcessor};
use crate::store::TripStore;
use crate::types::{
    GpsHealth, LiveMetrics, ProcessedPoint, RawSample, TrackerState, TripAggregate, TripId,
    TripStatus, TripUpdate,
};

// ============================================================================
// Context
// ============================================================================

/// Collaborators owned by the tracker.
pub struct TrackerContext {
    pub store: Box<dyn TripStore>,
    pub location: Box<dyn LocationSource>,
    pub clock: Arc<dyn Clock>,
    pub settings: TrackerSettings,
}

impl TrackerContext {
    /// Context with the system clock and default settings.
    pub fn new(store: impl TripStore + 'static, location: impl LocationSource + 'static) -> Self {
        Self {
            store: Box::new(store),
            location: Box::new(location),
            clock: Arc::new(SystemClock),
            settings: TrackerSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// In-memory state of the trip being tracked. Never persisted.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    trip: TripAggregate,
    last_accepted_point: Option<ProcessedPoint>,
    last_sample_wall_clock_ms: i64,
    gps_health: GpsHealth,
    is_paused: bool,
    auto_paused: bool,
    current_speed_kmh: f64,
    accuracy: Option<f64>,
    subscription: Option<SubscriptionHandle>,
    /// When speed first dropped below the auto-pause threshold
    low_speed_since_ms: Option<i64>,
    /// Latest fix seen while auto-paused, used to detect movement
    last_paused_sample: Option<RawSample>,
}

impl TrackingSession {
    fn new(trip: TripAggregate, now_ms: i64, subscription: Option<SubscriptionHandle>) -> Self {
        Self {
            trip,
            last_accepted_point: None,
            last_sample_wall_clock_ms: now_ms,
            gps_health: GpsHealth::Searching,
            is_paused: false,
            auto_paused: false,
            current_speed_kmh: 0.0,
            accuracy: None,
            subscription,
            low_speed_since_ms: None,
            last_paused_sample: None,
        }
    }

    pub fn trip_id(&self) -> TripId {
        self.trip.id
    }

    pub fn trip(&self) -> &TripAggregate {
        &self.trip
    }

    pub fn last_accepted_point(&self) -> Option<&ProcessedPoint> {
        self.last_accepted_point.as_ref()
    }

    pub fn last_sample_wall_clock_ms(&self) -> i64 {
        self.last_sample_wall_clock_ms
    }

    pub fn gps_health(&self) -> GpsHealth {
        self.gps_health
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn auto_paused(&self) -> bool {
        self.auto_paused
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    fn mark_fresh_fix(&mut self, sample: &RawSample, now_ms: i64) {
        self.gps_health = GpsHealth::Acquired;
        self.last_sample_wall_clock_ms = now_ms;
        self.accuracy = sample.horizontal_accuracy;
    }
}

/// What happened to a delivered fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// No trip is being tracked, or the fix had unusable coordinates
    Ignored,
    /// Trip is paused; only GPS health was updated
    SkippedWhilePaused,
    /// Fix was folded into the trip
    Accepted(SampleEstimate),
}

// ============================================================================
// Trip Tracker
// ============================================================================

/// The live tracking state machine.
pub struct TripTracker {
    context: TrackerContext,
    processor: SampleProcessor,
    session: Option<TrackingSession>,
    sample_tx: SampleSink,
    sample_rx: Option<mpsc::UnboundedReceiver<RawSample>>,
}

impl TripTracker {
    pub fn new(context: TrackerContext) -> Self {
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let processor = SampleProcessor::new(context.settings.noise_floor_kmh);
        Self {
            context,
            processor,
            session: None,
            sample_tx,
            sample_rx: Some(sample_rx),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> TrackerState {
        match &self.session {
            None => TrackerState::Idle,
            Some(s) if s.is_paused => TrackerState::Paused,
            Some(_) => TrackerState::Active,
        }
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.context.settings
    }

    pub fn now_ms(&self) -> i64 {
        self.context.clock.now_ms()
    }

    /// Read access to the store, for history views.
    pub fn store(&self) -> &dyn TripStore {
        self.context.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn TripStore {
        self.context.store.as_mut()
    }

    /// Hand the sample receiver to an external event loop. Returns `None` if
    /// it was already taken.
    pub fn take_sample_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<RawSample>> {
        self.sample_rx.take()
    }

    /// Process every fix queued by the location source. Only works while the
    /// tracker still owns its receiver.
    pub fn drain_samples(&mut self) -> usize {
        let Some(mut rx) = self.sample_rx.take() else {
            return 0;
        };
        let mut count = 0;
        while let Ok(sample) = rx.try_recv() {
            self.on_raw_sample(sample);
            count += 1;
        }
        self.sample_rx = Some(rx);
        count
    }

    /// Live values for UI and notifications.
    pub fn snapshot(&self) -> LiveMetrics {
        let Some(session) = &self.session else {
            return LiveMetrics::idle();
        };
        let now = self.now_ms();
        LiveMetrics {
            state: self.state(),
            trip_id: Some(session.trip.id),
            speed_kmh: session.current_speed_kmh,
            total_distance_meters: session.trip.total_distance_meters,
            avg_speed_kmh: session.trip.avg_speed_kmh,
            max_speed_kmh: session.trip.max_speed_kmh,
            elapsed_seconds: session.trip.elapsed_seconds(now),
            gps_health: session.gps_health,
            accuracy: session.accuracy,
            auto_paused: session.auto_paused,
        }
    }

    /// Replace settings. Disabling auto-pause disarms a pending auto-pause.
    pub fn update_settings(&mut self, settings: TrackerSettings) {
        self.processor = SampleProcessor::new(settings.noise_floor_kmh);
        if !settings.auto_pause_enabled {
            if let Some(session) = self.session.as_mut() {
                session.low_speed_since_ms = None;
            }
        }
        self.context.settings = settings;
    }

    fn invalid(&self, action: &'static str) -> TrackerError {
        TrackerError::InvalidTransition {
            state: self.state().as_str(),
            action,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start tracking a new trip.
    ///
    /// A trip left open by an earlier run is completed first. On location
    /// failure nothing is created and the tracker stays Idle.
    pub fn start(&mut self) -> Result<TripId> {
        if self.session.is_some() {
            return Err(self.invalid("start"));
        }
        let now = self.now_ms();

        self.complete_dangling_trip(now);
        self.discard_queued_samples();

        let subscription = self.context.location.subscribe(self.sample_tx.clone())?;

        let trip_id = match self.context.store.create_trip(now) {
            Ok(id) => id,
            Err(e) => {
                warn!("[TripTracker] Failed to create trip: {}", e);
                self.context.location.unsubscribe(subscription);
                return Err(e);
            }
        };

        self.session = Some(TrackingSession::new(
            TripAggregate::start(trip_id, now),
            now,
            Some(subscription),
        ));
        info!("[TripTracker] Started trip {}", trip_id);
        Ok(trip_id)
    }

    fn complete_dangling_trip(&mut self, now: i64) {
        match self.context.store.get_active_trip() {
            Ok(Some(dangling)) => {
                warn!(
                    "[TripTracker] Completing dangling trip {} before starting a new one",
                    dangling.id
                );
                if let Err(e) = self.context.store.mark_completed(dangling.id, now) {
                    warn!("[TripTracker] Failed to complete trip {}: {}", dangling.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("[TripTracker] Failed to look up open trip: {}", e),
        }
    }

    fn discard_queued_samples(&mut self) {
        if let Some(rx) = self.sample_rx.as_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    /// Resume an interrupted trip found in the store.
    ///
    /// The trip always comes back Active (a pause is not preserved across
    /// restarts) with elapsed time and average speed taken from the wall
    /// clock. If the location source cannot be reopened the trip is still
    /// restored and GPS health stays Searching until the watchdog marks it Lost.
    pub fn recover(&mut self) -> Result<Option<TripAggregate>> {
        if self.session.is_some() {
            return Err(self.invalid("recover"));
        }
        let Some(persisted) = self.context.store.get_active_trip()? else {
            return Ok(None);
        };
        let now = self.now_ms();

        let trip = TripAggregate::restore(
            persisted.id,
            persisted.started_at_ms,
            persisted.total_distance_meters,
            persisted.max_speed_kmh,
            persisted.avg_speed_kmh,
            now,
        );

        self.discard_queued_samples();
        let subscription = match self.context.location.subscribe(self.sample_tx.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(
                    "[TripTracker] Restored trip {} without location updates: {}",
                    trip.id, e
                );
                None
            }
        };

        let update = TripUpdate::totals(&trip).with_status(TripStatus::Active);
        if let Err(e) = self.context.store.update_trip_aggregate(trip.id, &update) {
            warn!("[TripTracker] Failed to persist restored trip {}: {}", trip.id, e);
        }

        info!(
            "[TripTracker] Recovered trip {} ({:.0}m, {}s elapsed)",
            trip.id,
            trip.total_distance_meters,
            trip.elapsed_seconds(now)
        );
        self.session = Some(TrackingSession::new(trip.clone(), now, subscription));
        Ok(Some(trip))
    }

    /// Explicit user pause.
    pub fn pause(&mut self) -> Result<()> {
        if self.state() != TrackerState::Active {
            return Err(self.invalid("pause"));
        }
        self.enter_pause(false);
        Ok(())
    }

    /// Explicit user resume. Also clears an auto-pause.
    pub fn resume(&mut self) -> Result<()> {
        if self.state() != TrackerState::Paused {
            return Err(self.invalid("resume"));
        }
        self.leave_pause(None);
        Ok(())
    }

    /// Finish the trip, persist its final summary and return it.
    pub fn stop(&mut self) -> Result<TripAggregate> {
        let Some(mut session) = self.session.take() else {
            return Err(self.invalid("stop"));
        };
        let now = self.now_ms();

        if let Some(handle) = session.subscription.take() {
            self.context.location.unsubscribe(handle);
        }

        session.trip.complete(now);
        let trip = session.trip;

        let update = TripUpdate {
            ended_at_ms: trip.ended_at_ms,
            ..TripUpdate::totals(&trip).with_status(TripStatus::Completed)
        };
        if let Err(e) = self.context.store.update_trip_aggregate(trip.id, &update) {
            warn!("[TripTracker] Failed to persist final summary for trip {}: {}", trip.id, e);
        }
        if let Err(e) = self.context.store.mark_completed(trip.id, now) {
            warn!("[TripTracker] Failed to mark trip {} completed: {}", trip.id, e);
        }

        info!(
            "[TripTracker] Stopped trip {}: {:.0}m in {}s, avg {:.1} km/h, max {:.1} km/h",
            trip.id,
            trip.total_distance_meters,
            trip.elapsed_seconds(now),
            trip.avg_speed_kmh,
            trip.max_speed_kmh
        );
        Ok(trip)
    }

    fn enter_pause(&mut self, auto: bool) {
        let now = self.now_ms();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.is_paused = true;
        session.auto_paused = auto;
        session.current_speed_kmh = 0.0;
        session.low_speed_since_ms = None;
        session.last_paused_sample = None;
        session.trip.recompute_average(now);
        session.trip.status = TripStatus::Paused;

        let trip_id = session.trip.id;
        info!(
            "[TripTracker] Trip {} {}",
            trip_id,
            if auto { "auto-paused" } else { "paused" }
        );
        self.persist_status(trip_id, TripStatus::Paused);
    }

    /// `anchor` becomes the distance anchor for the next fix. `None` means the
    /// next fix starts a fresh segment.
    fn leave_pause(&mut self, anchor: Option<ProcessedPoint>) {
        let now = self.now_ms();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let was_auto = session.auto_paused;
        session.is_paused = false;
        session.auto_paused = false;
        session.last_paused_sample = None;
        session.last_accepted_point = anchor;
        session.last_sample_wall_clock_ms = now;
        session.trip.status = TripStatus::Active;

        let trip_id = session.trip.id;
        info!(
            "[TripTracker] Trip {} {}",
            trip_id,
            if was_auto && anchor.is_some() {
                "auto-resumed"
            } else {
                "resumed"
            }
        );
        self.persist_status(trip_id, TripStatus::Active);
    }

    fn persist_status(&mut self, trip_id: TripId, status: TripStatus) {
        if let Err(e) = self
            .context
            .store
            .update_trip_aggregate(trip_id, &TripUpdate::status(status))
        {
            warn!(
                "[TripTracker] Failed to persist status {} for trip {}: {}",
                status.as_str(),
                trip_id,
                e
            );
        }
    }

    // ========================================================================
    // Samples
    // ========================================================================

    /// Handle one fix from the location source.
    pub fn on_raw_sample(&mut self, sample: RawSample) -> SampleOutcome {
        let now = self.now_ms();
        let settings = &self.context.settings;
        let auto_pause_enabled = settings.auto_pause_enabled;
        let threshold_kmh = settings.auto_pause_threshold_kmh();

        let Some(session) = self.session.as_mut() else {
            return SampleOutcome::Ignored;
        };
        if !sample.is_valid() {
            debug!(
                "[TripTracker] Ignoring fix with invalid coordinates ({}, {})",
                sample.latitude, sample.longitude
            );
            return SampleOutcome::Ignored;
        }

        if session.is_paused {
            session.mark_fresh_fix(&sample, now);
            if !(session.auto_paused && auto_pause_enabled) {
                return SampleOutcome::SkippedWhilePaused;
            }

            // Only fixes seen during the pause may anchor the resumed segment
            let previous = session.last_paused_sample;
            let estimate = self.processor.process(&sample, previous.as_ref());
            session.last_paused_sample = Some(sample);
            if estimate.speed_kmh < threshold_kmh {
                return SampleOutcome::SkippedWhilePaused;
            }

            let anchor = previous.map(|p| ProcessedPoint::from_sample(session.trip.id, &p, 0.0));
            self.leave_pause(anchor);
        }

        SampleOutcome::Accepted(self.accept_sample(sample, now))
    }

    fn accept_sample(&mut self, sample: RawSample, now: i64) -> SampleEstimate {
        let Some(session) = self.session.as_mut() else {
            return SampleEstimate::STATIONARY;
        };

        let estimate = self
            .processor
            .process(&sample, session.last_accepted_point.as_ref());
        let point = ProcessedPoint::from_sample(session.trip.id, &sample, estimate.speed_kmh);

        // In-memory state first; the store may lag or fail
        session.trip.apply_sample(&estimate, now);
        session.last_accepted_point = Some(point);
        session.current_speed_kmh = estimate.speed_kmh;
        session.mark_fresh_fix(&sample, now);

        let trip_id = session.trip.id;
        let update = TripUpdate::totals(&session.trip);
        debug!(
            "[TripTracker] Trip {}: {:.1} km/h, +{:.1}m",
            trip_id, estimate.speed_kmh, estimate.distance_increment_meters
        );

        if let Err(e) = self.context.store.append_point(trip_id, &point) {
            warn!("[TripTracker] Dropped point for trip {}: {}", trip_id, e);
        }
        if let Err(e) = self.context.store.update_trip_aggregate(trip_id, &update) {
            warn!("[TripTracker] Failed to update trip {}: {}", trip_id, e);
        }

        self.track_low_speed(estimate.speed_kmh, now);
        self.poll_auto_pause();
        estimate
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Arm or disarm the auto-pause debounce for the current speed.
    fn track_low_speed(&mut self, speed_kmh: f64, now: i64) {
        let settings = &self.context.settings;
        if !settings.auto_pause_enabled {
            return;
        }
        let threshold = settings.auto_pause_threshold_kmh();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_paused {
            return;
        }
        if speed_kmh < threshold {
            session.low_speed_since_ms.get_or_insert(now);
        } else {
            session.low_speed_since_ms = None;
        }
    }

    /// When the pending auto-pause fires, if one is armed.
    pub fn auto_pause_deadline_ms(&self) -> Option<i64> {
        let settings = &self.context.settings;
        if !settings.auto_pause_enabled {
            return None;
        }
        let session = self.session.as_ref()?;
        if session.is_paused {
            return None;
        }
        session
            .low_speed_since_ms
            .map(|since| since.saturating_add(clock_millis(settings.auto_pause_delay_ms)))
    }

    /// Fire the auto-pause if its deadline has passed. Returns true on pause.
    pub fn poll_auto_pause(&mut self) -> bool {
        match self.auto_pause_deadline_ms() {
            Some(deadline) if self.now_ms() >= deadline => {
                self.enter_pause(true);
                true
            }
            _ => false,
        }
    }

    /// ~1 Hz tick: decay a stale speed to 0 and refresh the average.
    pub fn on_decay_tick(&mut self) {
        let now = self.now_ms();
        let timeout = clock_millis(self.context.settings.speed_decay_timeout_ms);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // Elapsed time includes pauses, so the average keeps moving
        session.trip.recompute_average(now);
        if session.is_paused {
            return;
        }

        let decayed = now - session.last_sample_wall_clock_ms > timeout
            && session.current_speed_kmh > 0.0;
        if decayed {
            debug!(
                "[TripTracker] No fix for {}ms, decaying speed to 0",
                now - session.last_sample_wall_clock_ms
            );
            session.current_speed_kmh = 0.0;
            self.track_low_speed(0.0, now);
        }
        self.poll_auto_pause();
    }

    /// ~5 s tick: mark GPS health Lost after prolonged silence.
    pub fn on_health_tick(&mut self) {
        let now = self.now_ms();
        let timeout = clock_millis(self.context.settings.gps_loss_timeout_ms);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_paused || session.gps_health == GpsHealth::Lost {
            return;
        }
        let silence = now - session.last_sample_wall_clock_ms;
        if silence > timeout {
            warn!(
                "[TripTracker] GPS lost on trip {} (no fix for {}ms)",
                session.trip.id, silence
            );
            session.gps_health = GpsHealth::Lost;
        }
    }
}
