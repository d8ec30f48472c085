//! Tracker configuration.
//!
//! Settings persistence belongs to the host app; it hands the tracker a
//! [`TrackerSettings`] value, typically deserialized from its own JSON store.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo_utils;

/// Display unit system chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn speed_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "km/h",
            UnitSystem::Imperial => "mph",
        }
    }

    pub fn distance_label(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "km",
            UnitSystem::Imperial => "mi",
        }
    }
}

/// Configuration for sample processing, watchdogs and auto-pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerSettings {
    /// Unit system for display and for interpreting `auto_pause_speed`.
    /// Default: Metric
    pub units: UnitSystem,

    /// Pause automatically when the trip stops moving.
    /// Default: false
    pub auto_pause_enabled: bool,

    /// Auto-pause threshold in the user's speed unit (km/h or mph).
    /// Default: 2.0
    pub auto_pause_speed: f64,

    /// How long speed must stay below the threshold before pausing.
    /// Default: 5000 ms
    pub auto_pause_delay_ms: u64,

    /// Speeds below this are GPS jitter and clamp to 0.
    /// Default: 1.0 km/h
    pub noise_floor_kmh: f64,

    /// Silence after which GPS health becomes Lost.
    /// Default: 10000 ms
    pub gps_loss_timeout_ms: u64,

    /// Cadence of the GPS loss watchdog.
    /// Default: 5000 ms
    pub health_check_interval_ms: u64,

    /// Silence after which the displayed speed decays to 0.
    /// Default: 3000 ms
    pub speed_decay_timeout_ms: u64,

    /// Cadence of the speed decay / average speed tick.
    /// Default: 1000 ms
    pub decay_check_interval_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            units: UnitSystem::Metric,
            auto_pause_enabled: false,
            auto_pause_speed: 2.0,
            auto_pause_delay_ms: 5_000,
            noise_floor_kmh: 1.0,
            gps_loss_timeout_ms: 10_000,
            health_check_interval_ms: 5_000,
            speed_decay_timeout_ms: 3_000,
            decay_check_interval_ms: 1_000,
        }
    }
}

/// Convert a configured duration to signed clock milliseconds, saturating at
/// `i64::MAX` so arbitrarily large settings only push deadlines out.
pub fn clock_millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl TrackerSettings {
    /// Parse settings from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Auto-pause threshold converted to km/h.
    pub fn auto_pause_threshold_kmh(&self) -> f64 {
        geo_utils::speed_to_kmh(self.auto_pause_speed, self.units)
    }
}
