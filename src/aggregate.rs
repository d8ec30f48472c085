//! # Trip Aggregate
//!
//! Running totals for one trip. Distance and max speed only ever grow; the
//! average speed is recomputed from wall-clock time since the trip started,
//! paused intervals included.

use log::debug;

use crate::processor::SampleEstimate;
use crate::types::{TripAggregate, TripId, TripStatus};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Average speed in km/h for a distance covered since `started_at_ms`.
pub fn average_speed_kmh(total_distance_meters: f64, started_at_ms: i64, now_ms: i64) -> f64 {
    let elapsed_hours = (now_ms - started_at_ms) as f64 / MS_PER_HOUR;
    if elapsed_hours <= 0.0 {
        return 0.0;
    }
    (total_distance_meters / 1000.0) / elapsed_hours
}

impl TripAggregate {
    /// A fresh trip with zero totals.
    pub fn start(id: TripId, started_at_ms: i64) -> Self {
        Self {
            id,
            started_at_ms,
            ended_at_ms: None,
            total_distance_meters: 0.0,
            max_speed_kmh: 0.0,
            avg_speed_kmh: 0.0,
            status: TripStatus::Active,
        }
    }

    /// Rehydrate a trip from persisted totals.
    ///
    /// The stored average is only a fallback: elapsed time is re-derived from
    /// the wall clock, so the average is recomputed for `now_ms`.
    pub fn restore(
        id: TripId,
        started_at_ms: i64,
        total_distance_meters: f64,
        max_speed_kmh: f64,
        avg_speed_kmh: f64,
        now_ms: i64,
    ) -> Self {
        let mut trip = Self {
            id,
            started_at_ms,
            ended_at_ms: None,
            total_distance_meters: sanitize(total_distance_meters),
            max_speed_kmh: sanitize(max_speed_kmh),
            avg_speed_kmh: sanitize(avg_speed_kmh),
            status: TripStatus::Active,
        };
        trip.recompute_average(now_ms);
        trip
    }

    pub fn is_completed(&self) -> bool {
        self.status == TripStatus::Completed
    }

    /// Fold one accepted sample into the totals. Returns false when the trip is
    /// already completed and nothing changed.
    pub fn apply_sample(&mut self, estimate: &SampleEstimate, now_ms: i64) -> bool {
        if self.is_completed() {
            return false;
        }

        if estimate.speed_kmh.is_finite() && estimate.speed_kmh > self.max_speed_kmh {
            self.max_speed_kmh = estimate.speed_kmh;
        }

        let increment = estimate.distance_increment_meters;
        if increment.is_finite() && increment > 0.0 {
            self.total_distance_meters += increment;
        }

        self.recompute_average(now_ms);
        debug!(
            "[TripAggregate] trip {}: +{:.1}m -> {:.1}m, max {:.1} km/h",
            self.id, increment, self.total_distance_meters, self.max_speed_kmh
        );
        true
    }

    /// Recompute the average speed for the current wall-clock time.
    pub fn recompute_average(&mut self, now_ms: i64) {
        if self.is_completed() {
            return;
        }
        self.avg_speed_kmh = average_speed_kmh(self.total_distance_meters, self.started_at_ms, now_ms);
    }

    /// Whole seconds since the trip started (frozen at the end time once completed).
    pub fn elapsed_seconds(&self, now_ms: i64) -> u64 {
        let end = self.ended_at_ms.unwrap_or(now_ms);
        (end - self.started_at_ms).max(0) as u64 / 1000
    }

    /// Close the trip. Final average is computed at `ended_at_ms`.
    pub fn complete(&mut self, ended_at_ms: i64) {
        if self.is_completed() {
            return;
        }
        self.recompute_average(ended_at_ms);
        self.ended_at_ms = Some(ended_at_ms);
        self.status = TripStatus::Completed;
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(speed_kmh: f64, meters: f64) -> SampleEstimate {
        SampleEstimate {
            speed_kmh,
            distance_increment_meters: meters,
        }
    }

    #[test]
    fn test_start_has_zero_totals() {
        let trip = TripAggregate::start(TripId(7), 1_000);
        assert_eq!(trip.total_distance_meters, 0.0);
        assert_eq!(trip.max_speed_kmh, 0.0);
        assert_eq!(trip.avg_speed_kmh, 0.0);
        assert_eq!(trip.status, TripStatus::Active);
    }

    #[test]
    fn test_apply_accumulates_and_tracks_max() {
        let mut trip = TripAggregate::start(TripId(1), 0);
        trip.apply_sample(&moving(20.0, 100.0), 60_000);
        trip.apply_sample(&moving(10.0, 50.0), 120_000);
        assert_eq!(trip.total_distance_meters, 150.0);
        assert_eq!(trip.max_speed_kmh, 20.0);
        // 0.15 km in 2 minutes = 4.5 km/h
        assert!((trip.avg_speed_kmh - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_under_bad_increments() {
        let mut trip = TripAggregate::start(TripId(1), 0);
        trip.apply_sample(&moving(15.0, 10.0), 1_000);
        trip.apply_sample(&moving(f64::NAN, -5.0), 2_000);
        trip.apply_sample(&moving(0.0, f64::INFINITY), 3_000);
        assert_eq!(trip.total_distance_meters, 10.0);
        assert_eq!(trip.max_speed_kmh, 15.0);
    }

    #[test]
    fn test_average_zero_without_elapsed_time() {
        assert_eq!(average_speed_kmh(1000.0, 5_000, 5_000), 0.0);
        assert_eq!(average_speed_kmh(1000.0, 5_000, 4_000), 0.0);
        let mut trip = TripAggregate::start(TripId(1), 5_000);
        trip.apply_sample(&moving(10.0, 10.0), 5_000);
        assert_eq!(trip.avg_speed_kmh, 0.0);
    }

    #[test]
    fn test_restore_recomputes_average_from_wall_clock() {
        let t = 1_700_000_000_000;
        let trip = TripAggregate::restore(TripId(3), t, 500.0, 12.0, 99.0, t + 600_000);
        assert_eq!(trip.elapsed_seconds(t + 600_000), 600);
        assert!((trip.avg_speed_kmh - 3.0).abs() < 1e-9);
        assert_eq!(trip.total_distance_meters, 500.0);
        assert_eq!(trip.max_speed_kmh, 12.0);
        assert_eq!(trip.status, TripStatus::Active);
    }

    #[test]
    fn test_completed_trip_is_frozen() {
        let mut trip = TripAggregate::start(TripId(1), 0);
        trip.apply_sample(&moving(10.0, 1000.0), 360_000);
        trip.complete(360_000);
        assert!(!trip.apply_sample(&moving(50.0, 500.0), 400_000));
        trip.recompute_average(720_000);
        assert_eq!(trip.total_distance_meters, 1000.0);
        assert_eq!(trip.max_speed_kmh, 10.0);
        assert!((trip.avg_speed_kmh - 10.0).abs() < 1e-9);
        assert_eq!(trip.elapsed_seconds(10_000_000), 360);
    }
}
