//! Geographic utilities: great-circle distance, unit conversion and display
//! formatting.
//!
//! All functions are pure. Rounding only happens in the `format_*` helpers.

use crate::config::UnitSystem;
use crate::types::{ProcessedPoint, RawSample};

/// Mean Earth radius used for all distance calculations, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// m/s to km/h
pub const MPS_TO_KMH: f64 = 3.6;
pub const KMH_TO_MPH: f64 = 0.621371;
pub const MPH_TO_KMH: f64 = 1.60934;
pub const METERS_PER_MILE: f64 = 1609.34;

/// Anything with a latitude/longitude in degrees.
pub trait Coordinate {
    fn lat_lng(&self) -> (f64, f64);
}

impl Coordinate for RawSample {
    fn lat_lng(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl Coordinate for ProcessedPoint {
    fn lat_lng(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl Coordinate for (f64, f64) {
    fn lat_lng(&self) -> (f64, f64) {
        *self
    }
}

/// Calculate haversine distance between two coordinates in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards against a > 1 from float error on antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// Great-circle distance between any two coordinates, in meters.
///
/// # Example
/// ```
/// use trip_tracker::geo_utils::distance_meters;
/// let london = (51.5074, -0.1278);
/// let paris = (48.8566, 2.3522);
/// let d = distance_meters(&london, &paris);
/// assert!((d / 1000.0 - 343.5).abs() < 1.0);
/// ```
pub fn distance_meters<A: Coordinate, B: Coordinate>(a: &A, b: &B) -> f64 {
    let (lat1, lon1) = a.lat_lng();
    let (lat2, lon2) = b.lat_lng();
    haversine_distance(lat1, lon1, lat2, lon2)
}

/// Total length of a path in meters.
pub fn polyline_length<C: Coordinate>(points: &[C]) -> f64 {
    points
        .windows(2)
        .map(|w| distance_meters(&w[0], &w[1]))
        .sum()
}

// ============================================================================
// Unit conversion
// ============================================================================

pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * MPS_TO_KMH
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * KMH_TO_MPH
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * MPH_TO_KMH
}

pub fn meters_to_km(meters: f64) -> f64 {
    meters / 1000.0
}

pub fn km_to_meters(km: f64) -> f64 {
    km * 1000.0
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

/// Speed in the user's unit (km/h or mph).
pub fn speed_in_units(kmh: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => kmh,
        UnitSystem::Imperial => kmh_to_mph(kmh),
    }
}

/// Convert a speed given in the user's unit back to km/h.
pub fn speed_to_kmh(value: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => value,
        UnitSystem::Imperial => mph_to_kmh(value),
    }
}

/// Distance in the user's unit (km or mi).
pub fn distance_in_units(meters: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => meters_to_km(meters),
        UnitSystem::Imperial => meters_to_miles(meters),
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// `H:MM:SS` when at least an hour, else `M:SS`.
///
/// ```
/// use trip_tracker::geo_utils::format_duration;
/// assert_eq!(format_duration(59), "0:59");
/// assert_eq!(format_duration(3725), "1:02:05");
/// ```
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub fn format_speed(kmh: f64, units: UnitSystem) -> String {
    format!("{:.1} {}", speed_in_units(kmh, units), units.speed_label())
}

pub fn format_distance(meters: f64, units: UnitSystem) -> String {
    format!(
        "{:.1} {}",
        distance_in_units(meters, units),
        units.distance_label()
    )
}
