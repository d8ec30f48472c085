//! Historical trip view: bounds, center and a simplified polyline for map
//! rendering of a completed (or in-progress) trip.

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::geo_utils;
use crate::store::TripStore;
use crate::types::{ProcessedPoint, TripAggregate, TripId};

/// Bounding box for a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from `(lat, lng)` pairs.
    pub fn from_coords(coords: &[(f64, f64)]) -> Option<Self> {
        if coords.is_empty() {
            return None;
        }
        let mut bounds = Self {
            min_lat: f64::MAX,
            max_lat: f64::MIN,
            min_lng: f64::MAX,
            max_lng: f64::MIN,
        };
        for &(lat, lng) in coords {
            bounds.min_lat = bounds.min_lat.min(lat);
            bounds.max_lat = bounds.max_lat.max(lat);
            bounds.min_lng = bounds.min_lng.min(lng);
            bounds.max_lng = bounds.max_lng.max(lng);
        }
        Some(bounds)
    }

    /// Get the center point of the bounds as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Render-ready geometry for one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripTrack {
    pub trip_id: TripId,
    /// Simplified `(lat, lng)` polyline
    pub points: Vec<(f64, f64)>,
    /// Length of the full, unsimplified path in meters
    pub path_length_meters: f64,
    pub bounds: Bounds,
    pub center: (f64, f64),
    /// Number of stored points before simplification
    pub source_point_count: usize,
}

impl TripTrack {
    /// Default Douglas-Peucker tolerance in degrees (~5 meters).
    pub const DEFAULT_TOLERANCE: f64 = 0.00005;

    /// Build a track from stored points (already ordered by capture time).
    ///
    /// Returns `None` if there are no points.
    pub fn from_points(trip_id: TripId, points: &[ProcessedPoint], tolerance: f64) -> Option<Self> {
        let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.latitude, p.longitude)).collect();
        let bounds = Bounds::from_coords(&coords)?;

        let line = LineString::new(
            coords
                .iter()
                .map(|&(lat, lng)| Coord { x: lng, y: lat })
                .collect(),
        );
        let simplified: Vec<(f64, f64)> = line
            .simplify(&tolerance.max(0.0))
            .0
            .iter()
            .map(|c| (c.y, c.x))
            .collect();

        Some(Self {
            trip_id,
            path_length_meters: geo_utils::polyline_length(&coords),
            center: bounds.center(),
            bounds,
            points: simplified,
            source_point_count: coords.len(),
        })
    }

    /// Load a trip's points from the store and build its track.
    pub fn load(store: &dyn TripStore, trip_id: TripId, tolerance: f64) -> Result<Option<Self>> {
        let points = store.get_points_for_trip(trip_id)?;
        Ok(Self::from_points(trip_id, &points, tolerance))
    }
}

/// A stored trip together with its track, for history screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripHistoryEntry {
    pub trip: TripAggregate,
    pub track: Option<TripTrack>,
}

/// Load one trip and its simplified track.
pub fn load_history_entry(
    store: &dyn TripStore,
    trip_id: TripId,
    tolerance: f64,
) -> Result<TripHistoryEntry> {
    let trip = store
        .get_trip(trip_id)?
        .ok_or(TrackerError::TripNotFound(trip_id))?;
    let track = TripTrack::load(store, trip_id, tolerance)?;
    Ok(TripHistoryEntry { trip, track })
}
