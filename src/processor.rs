//! # Sample Processor
//!
//! Turns one raw fix plus the previously accepted point into a speed estimate
//! and a distance increment.
//!
//! ## Algorithm
//!
//! 1. Device-reported speed (m/s) wins when present and non-negative.
//! 2. Otherwise speed is derived from the haversine distance to the previous
//!    point over the time delta, when the delta is positive.
//! 3. Otherwise speed is 0.
//! 4. Speeds under the noise floor clamp to exactly 0.
//! 5. Distance is only counted when the clamped speed is non-zero and a
//!    previous point exists, so stationary jitter never adds distance.

use crate::geo_utils::{self, Coordinate};
use crate::types::{ProcessedPoint, RawSample};

/// A coordinate with a capture timestamp.
pub trait Fix: Coordinate {
    fn captured_at_ms(&self) -> i64;
}

impl Fix for RawSample {
    fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }
}

impl Fix for ProcessedPoint {
    fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }
}

/// Output of processing one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleEstimate {
    /// Speed after noise-floor clamping
    pub speed_kmh: f64,
    /// Distance to add to the trip total, in meters
    pub distance_increment_meters: f64,
}

impl SampleEstimate {
    pub const STATIONARY: SampleEstimate = SampleEstimate {
        speed_kmh: 0.0,
        distance_increment_meters: 0.0,
    };

    pub fn is_moving(&self) -> bool {
        self.speed_kmh > 0.0
    }
}

/// Stateless speed/distance estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleProcessor {
    noise_floor_kmh: f64,
}

impl Default for SampleProcessor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SampleProcessor {
    pub fn new(noise_floor_kmh: f64) -> Self {
        Self {
            noise_floor_kmh: noise_floor_kmh.max(0.0),
        }
    }

    pub fn noise_floor_kmh(&self) -> f64 {
        self.noise_floor_kmh
    }

    /// Estimate speed and distance increment for `current`.
    pub fn process<P: Fix>(&self, current: &RawSample, previous: Option<&P>) -> SampleEstimate {
        let raw_kmh = self.raw_speed_kmh(current, previous);
        let speed_kmh = self.apply_noise_floor(raw_kmh);

        let distance_increment_meters = match previous {
            Some(prev) if speed_kmh > 0.0 => geo_utils::distance_meters(prev, current),
            _ => 0.0,
        };

        SampleEstimate {
            speed_kmh,
            distance_increment_meters,
        }
    }

    fn raw_speed_kmh<P: Fix>(&self, current: &RawSample, previous: Option<&P>) -> f64 {
        if let Some(mps) = current.usable_speed() {
            return geo_utils::mps_to_kmh(mps);
        }

        let Some(prev) = previous else {
            return 0.0;
        };

        let dt_secs = (current.captured_at_ms - prev.captured_at_ms()) as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return 0.0;
        }

        geo_utils::mps_to_kmh(geo_utils::distance_meters(prev, current) / dt_secs)
    }

    fn apply_noise_floor(&self, kmh: f64) -> f64 {
        if !kmh.is_finite() || kmh < self.noise_floor_kmh {
            0.0
        } else {
            kmh
        }
    }
}
