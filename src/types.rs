//! Data model shared by the processor, aggregate, state machine and stores.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Store-assigned trip identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(pub i64);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Samples
// ============================================================================

/// One GPS fix as delivered by the location source.
///
/// # Example
/// ```
/// use trip_tracker::RawSample;
/// let fix = RawSample::new(51.5074, -0.1278, 1_700_000_000_000)
///     .with_speed(4.2)
///     .with_accuracy(5.0);
/// assert_eq!(fix.instant_speed, Some(4.2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Device-reported speed in m/s
    pub instant_speed: Option<f64>,
    /// Altitude in meters
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub horizontal_accuracy: Option<f64>,
    /// Capture time, milliseconds since Unix epoch
    pub captured_at_ms: i64,
}

impl RawSample {
    /// Create a fix with only a position and timestamp.
    pub fn new(latitude: f64, longitude: f64, captured_at_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            instant_speed: None,
            altitude: None,
            horizontal_accuracy: None,
            captured_at_ms,
        }
    }

    pub fn with_speed(mut self, meters_per_second: f64) -> Self {
        self.instant_speed = Some(meters_per_second);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.horizontal_accuracy = Some(accuracy);
        self
    }

    /// Check if the fix has usable coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Device speed if it is a usable, non-negative value.
    pub fn usable_speed(&self) -> Option<f64> {
        self.instant_speed.filter(|s| s.is_finite() && *s >= 0.0)
    }
}

/// A fix that was accepted into a trip. Append-only, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPoint {
    pub trip_id: TripId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub captured_at_ms: i64,
}

impl ProcessedPoint {
    pub fn from_sample(trip_id: TripId, sample: &RawSample, speed_kmh: f64) -> Self {
        Self {
            trip_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed_kmh,
            altitude: sample.altitude,
            accuracy: sample.horizontal_accuracy,
            captured_at_ms: sample.captured_at_ms,
        }
    }
}

// ============================================================================
// Trips
// ============================================================================

/// Lifecycle status of a persisted trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Active,
    Paused,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Paused => "paused",
            TripStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(TripStatus::Active),
            "paused" => Some(TripStatus::Paused),
            "completed" => Some(TripStatus::Completed),
            _ => None,
        }
    }
}

/// Running summary of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripAggregate {
    pub id: TripId,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
    /// Non-decreasing while the trip is open
    pub total_distance_meters: f64,
    /// Non-decreasing, floor of 0
    pub max_speed_kmh: f64,
    /// Recomputed from wall-clock elapsed time
    pub avg_speed_kmh: f64,
    pub status: TripStatus,
}

/// Partial update for a persisted trip. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripUpdate {
    pub total_distance_meters: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub avg_speed_kmh: Option<f64>,
    pub status: Option<TripStatus>,
    pub ended_at_ms: Option<i64>,
}

impl TripUpdate {
    /// Update carrying the running totals of an aggregate.
    pub fn totals(trip: &TripAggregate) -> Self {
        Self {
            total_distance_meters: Some(trip.total_distance_meters),
            max_speed_kmh: Some(trip.max_speed_kmh),
            avg_speed_kmh: Some(trip.avg_speed_kmh),
            ..Self::default()
        }
    }

    pub fn status(status: TripStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TripStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply this update to an in-memory aggregate.
    pub fn apply_to(&self, trip: &mut TripAggregate) {
        if let Some(d) = self.total_distance_meters {
            trip.total_distance_meters = d;
        }
        if let Some(s) = self.max_speed_kmh {
            trip.max_speed_kmh = s;
        }
        if let Some(s) = self.avg_speed_kmh {
            trip.avg_speed_kmh = s;
        }
        if let Some(status) = self.status {
            trip.status = status;
        }
        if let Some(end) = self.ended_at_ms {
            trip.ended_at_ms = Some(end);
        }
    }
}

// ============================================================================
// Live state
// ============================================================================

/// Freshness of the location signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpsHealth {
    Searching,
    Acquired,
    Lost,
}

/// Lifecycle of the tracker itself. A stopped trip is `Completed` in the store
/// while the tracker returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerState {
    Idle,
    Active,
    Paused,
}

impl TrackerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerState::Idle => "idle",
            TrackerState::Active => "active",
            TrackerState::Paused => "paused",
        }
    }
}

/// Read-only view handed to UI and notification layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetrics {
    pub state: TrackerState,
    pub trip_id: Option<TripId>,
    pub speed_kmh: f64,
    pub total_distance_meters: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub elapsed_seconds: u64,
    pub gps_health: GpsHealth,
    pub accuracy: Option<f64>,
    pub auto_paused: bool,
}

impl LiveMetrics {
    pub fn idle() -> Self {
        Self {
            state: TrackerState::Idle,
            trip_id: None,
            speed_kmh: 0.0,
            total_distance_meters: 0.0,
            avg_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            elapsed_seconds: 0,
            gps_health: GpsHealth::Searching,
            accuracy: None,
            auto_paused: false,
        }
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validation() {
        assert!(RawSample::new(51.5074, -0.1278, 0).is_valid());
        assert!(!RawSample::new(91.0, 0.0, 0).is_valid());
        assert!(!RawSample::new(0.0, 181.0, 0).is_valid());
        assert!(!RawSample::new(f64::NAN, 0.0, 0).is_valid());
    }

    #[test]
    fn test_usable_speed_rejects_negative_and_nan() {
        let base = RawSample::new(0.0, 0.0, 0);
        assert_eq!(base.usable_speed(), None);
        assert_eq!(base.with_speed(-1.0).usable_speed(), None);
        assert_eq!(base.with_speed(f64::NAN).usable_speed(), None);
        assert_eq!(base.with_speed(0.0).usable_speed(), Some(0.0));
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [TripStatus::Active, TripStatus::Paused, TripStatus::Completed] {
            assert_eq!(TripStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TripStatus::parse("bogus"), None);
    }

    #[test]
    fn test_partial_update_leaves_missing_fields() {
        let mut trip = TripAggregate {
            id: TripId(1),
            started_at_ms: 0,
            ended_at_ms: None,
            total_distance_meters: 100.0,
            max_speed_kmh: 20.0,
            avg_speed_kmh: 10.0,
            status: TripStatus::Active,
        };
        TripUpdate::status(TripStatus::Paused).apply_to(&mut trip);
        assert_eq!(trip.status, TripStatus::Paused);
        assert_eq!(trip.total_distance_meters, 100.0);
        assert!(TripUpdate::default().is_empty());
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let json = serde_json::to_string(&LiveMetrics::idle()).unwrap();
        assert!(json.contains("\"gpsHealth\":\"searching\""));
        assert!(json.contains("\"totalDistanceMeters\""));
    }
}
