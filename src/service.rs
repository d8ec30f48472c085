//! # Tracking Service
//!
//! Runs a [`TripTracker`] on a single tokio task. All state transitions are
//! serialized through one `select!` loop:
//!
//! - fixes from the location source
//! - the speed-decay tick (~1 Hz) and the GPS-loss tick (~5 s)
//! - the auto-pause debounce deadline
//! - commands from [`TrackingHandle`]
//!
//! After every event the latest [`LiveMetrics`] are published on a `watch`
//! channel for UI and notification layers.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::config::TrackerSettings;
use crate::error::{Result, TrackerError};
use crate::tracker::TripTracker;
use crate::types::{LiveMetrics, RawSample, TripAggregate, TripId};

const COMMAND_BUFFER: usize = 16;

/// Longest timer wait; larger settings are treated as one day.
const MAX_TICK_MS: u64 = 86_400_000;

enum Command {
    Start(oneshot::Sender<Result<TripId>>),
    Stop(oneshot::Sender<Result<TripAggregate>>),
    Pause(oneshot::Sender<Result<()>>),
    Resume(oneshot::Sender<Result<()>>),
    Recover(oneshot::Sender<Result<Option<TripAggregate>>>),
    Snapshot(oneshot::Sender<Result<LiveMetrics>>),
    UpdateSettings(TrackerSettings, oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Spawns the event loop for a tracker.
pub struct TrackingService;

impl TrackingService {
    /// Move `tracker` onto a tokio task. Must be called inside a runtime.
    pub fn spawn(mut tracker: TripTracker) -> Result<TrackingHandle> {
        let samples = tracker
            .take_sample_receiver()
            .ok_or_else(|| TrackerError::Config {
                message: "tracker sample receiver already taken".to_string(),
            })?;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (metrics_tx, metrics_rx) = watch::channel(tracker.snapshot());

        let task = tokio::spawn(run(tracker, samples, command_rx, metrics_tx));
        info!("[TrackingService] Started");

        Ok(TrackingHandle {
            commands: command_tx,
            metrics: metrics_rx,
            task,
        })
    }
}

/// Client side of a running [`TrackingService`].
pub struct TrackingHandle {
    commands: mpsc::Sender<Command>,
    metrics: watch::Receiver<LiveMetrics>,
    task: JoinHandle<TripTracker>,
}

impl TrackingHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| TrackerError::ServiceClosed)?;
        rx.await.map_err(|_| TrackerError::ServiceClosed)?
    }

    pub async fn start(&self) -> Result<TripId> {
        self.request(Command::Start).await
    }

    pub async fn stop(&self) -> Result<TripAggregate> {
        self.request(Command::Stop).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Command::Resume).await
    }

    /// Resume a trip interrupted by a previous process, if any.
    pub async fn recover(&self) -> Result<Option<TripAggregate>> {
        self.request(Command::Recover).await
    }

    /// Metrics computed by the loop at the time the request is handled.
    pub async fn snapshot(&self) -> Result<LiveMetrics> {
        self.request(Command::Snapshot).await
    }

    pub async fn update_settings(&self, settings: TrackerSettings) -> Result<()> {
        self.request(|tx| Command::UpdateSettings(settings, tx)).await
    }

    /// Latest published metrics.
    pub fn metrics(&self) -> LiveMetrics {
        self.metrics.borrow().clone()
    }

    /// Receiver notified after every processed event.
    pub fn subscribe_metrics(&self) -> watch::Receiver<LiveMetrics> {
        self.metrics.clone()
    }

    /// Stop the event loop and get the tracker back.
    pub async fn shutdown(self) -> Result<TripTracker> {
        // A closed channel means the loop already ended; the join below still
        // returns the tracker.
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|_| TrackerError::ServiceClosed)
    }
}

fn ticker(period_ms: u64) -> Interval {
    let mut interval = time::interval(Duration::from_millis(period_ms.clamp(1, MAX_TICK_MS)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run(
    mut tracker: TripTracker,
    mut samples: mpsc::UnboundedReceiver<RawSample>,
    mut commands: mpsc::Receiver<Command>,
    metrics: watch::Sender<LiveMetrics>,
) -> TripTracker {
    let mut decay = ticker(tracker.settings().decay_check_interval_ms);
    let mut health = ticker(tracker.settings().health_check_interval_ms);

    loop {
        let auto_pause_wait = tracker
            .auto_pause_deadline_ms()
            .map(|deadline| {
                let wait = deadline.saturating_sub(tracker.now_ms()).max(0) as u64;
                Duration::from_millis(wait.min(MAX_TICK_MS))
            });
        let auto_pause_timer = async move {
            match auto_pause_wait {
                Some(wait) => time::sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(sample) = samples.recv() => {
                tracker.on_raw_sample(sample);
            }
            _ = decay.tick() => tracker.on_decay_tick(),
            _ = health.tick() => tracker.on_health_tick(),
            _ = auto_pause_timer => {
                tracker.poll_auto_pause();
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("[TrackingService] All handles dropped");
                    break;
                };
                match command {
                    Command::Start(reply) => {
                        // Fixes queued before the trip existed belong to no trip
                        while samples.try_recv().is_ok() {}
                        let _ = reply.send(tracker.start());
                    }
                    Command::Stop(reply) => {
                        let _ = reply.send(tracker.stop());
                    }
                    Command::Pause(reply) => {
                        let _ = reply.send(tracker.pause());
                    }
                    Command::Resume(reply) => {
                        let _ = reply.send(tracker.resume());
                    }
                    Command::Recover(reply) => {
                        while samples.try_recv().is_ok() {}
                        let _ = reply.send(tracker.recover());
                    }
                    Command::Snapshot(reply) => {
                        let _ = reply.send(Ok(tracker.snapshot()));
                    }
                    Command::UpdateSettings(settings, reply) => {
                        decay = ticker(settings.decay_check_interval_ms);
                        health = ticker(settings.health_check_interval_ms);
                        tracker.update_settings(settings);
                        let _ = reply.send(Ok(()));
                    }
                    Command::Shutdown => break,
                }
            }
        }

        metrics.send_replace(tracker.snapshot());
    }

    info!("[TrackingService] Stopped");
    tracker
}
