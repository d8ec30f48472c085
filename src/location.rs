//! Location Source boundary.
//!
//! The platform delivers fixes by pushing them into a [`SampleSink`] handed over
//! at subscription time. Delivery is best-effort: the OS may stop sending while
//! the app is suspended.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use tokio::sync::mpsc;

use crate::error::{Result, TrackerError};
use crate::types::RawSample;

/// Channel end the location source pushes fixes into.
pub type SampleSink = mpsc::UnboundedSender<RawSample>;

/// Opaque handle identifying one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Push-based supplier of raw fixes.
pub trait LocationSource: Send {
    /// Start delivering fixes into `sink`. Fails when location access is
    /// denied or location services are off.
    fn subscribe(&mut self, sink: SampleSink) -> Result<SubscriptionHandle>;

    /// Stop delivering fixes for `handle`. Unknown handles are ignored.
    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

// ============================================================================
// Push Location Source
// ============================================================================

#[derive(Debug)]
struct PushState {
    available: bool,
    unavailable_reason: String,
    next_id: u64,
    subscribers: Vec<(SubscriptionHandle, SampleSink)>,
}

/// Location source fed by host/platform code.
///
/// Clones share state: the tracker owns one clone while the platform glue keeps
/// another and calls [`push`](PushLocationSource::push) for every fix.
#[derive(Debug, Clone)]
pub struct PushLocationSource {
    state: Arc<Mutex<PushState>>,
}

impl Default for PushLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PushLocationSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PushState {
                available: true,
                unavailable_reason: String::new(),
                next_id: 1,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the source available or not. While unavailable, new subscriptions
    /// fail with [`TrackerError::LocationUnavailable`].
    pub fn set_available(&self, available: bool, reason: &str) {
        let mut state = self.lock();
        state.available = available;
        state.unavailable_reason = reason.to_string();
    }

    /// Deliver a fix to every live subscriber. Returns how many received it.
    pub fn push(&self, sample: RawSample) -> usize {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|(_, sink)| sink.send(sample).is_ok());
        state.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscriber_count() > 0
    }
}

impl LocationSource for PushLocationSource {
    fn subscribe(&mut self, sink: SampleSink) -> Result<SubscriptionHandle> {
        let mut state = self.lock();
        if !state.available {
            let reason = if state.unavailable_reason.is_empty() {
                "location services disabled".to_string()
            } else {
                state.unavailable_reason.clone()
            };
            return Err(TrackerError::location(reason));
        }

        let handle = SubscriptionHandle(state.next_id);
        state.next_id += 1;
        state.subscribers.push((handle, sink));
        info!("[PushLocationSource] Subscription {} opened", handle.0);
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(h, _)| *h != handle);
        if state.subscribers.len() < before {
            info!("[PushLocationSource] Subscription {} closed", handle.0);
        } else {
            debug!("[PushLocationSource] Unknown subscription {}", handle.0);
        }
    }
}
