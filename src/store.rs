//! Persistence Gateway boundary and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, TrackerError};
use crate::types::{ProcessedPoint, TripAggregate, TripId, TripStatus, TripUpdate};

/// Durable store for trips and their accepted points.
pub trait TripStore: Send {
    /// Create a new Active trip with zero totals.
    fn create_trip(&mut self, started_at_ms: i64) -> Result<TripId>;

    /// Append an accepted point. Returns the point's row id.
    fn append_point(&mut self, trip_id: TripId, point: &ProcessedPoint) -> Result<i64>;

    /// Write the `Some` fields of `update`.
    fn update_trip_aggregate(&mut self, trip_id: TripId, update: &TripUpdate) -> Result<()>;

    /// Stamp the end time and set status Completed.
    fn mark_completed(&mut self, trip_id: TripId, ended_at_ms: i64) -> Result<()>;

    /// The most recent trip that is not Completed, if any.
    fn get_active_trip(&self) -> Result<Option<TripAggregate>>;

    /// Points for a trip ordered by capture time.
    fn get_points_for_trip(&self, trip_id: TripId) -> Result<Vec<ProcessedPoint>>;

    fn get_trip(&self, trip_id: TripId) -> Result<Option<TripAggregate>>;

    /// All trips, newest first.
    fn list_trips(&self) -> Result<Vec<TripAggregate>>;

    /// Delete a trip and its points. Returns false if it did not exist.
    fn delete_trip(&mut self, trip_id: TripId) -> Result<bool>;
}

// ============================================================================
// Memory Trip Store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    next_trip_id: i64,
    next_point_id: i64,
    trips: BTreeMap<TripId, TripAggregate>,
    points: BTreeMap<TripId, Vec<ProcessedPoint>>,
    fail_writes: bool,
}

/// In-memory store. Clones share the same data, which lets a caller keep a
/// handle for inspection after moving one into the tracker.
#[derive(Debug, Clone, Default)]
pub struct MemoryTripStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every write fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Insert a trip as-is, e.g. to simulate state left by a previous process.
    pub fn insert_trip(&self, trip: TripAggregate) {
        let mut state = self.lock();
        state.next_trip_id = state.next_trip_id.max(trip.id.0);
        state.points.entry(trip.id).or_default();
        state.trips.insert(trip.id, trip);
    }

    pub fn point_count(&self, trip_id: TripId) -> usize {
        self.lock().points.get(&trip_id).map_or(0, Vec::len)
    }
}

fn check_writable(state: &MemoryState) -> Result<()> {
    if state.fail_writes {
        return Err(TrackerError::persistence("write rejected"));
    }
    Ok(())
}

impl TripStore for MemoryTripStore {
    fn create_trip(&mut self, started_at_ms: i64) -> Result<TripId> {
        let mut state = self.lock();
        check_writable(&state)?;
        state.next_trip_id += 1;
        let id = TripId(state.next_trip_id);
        state.trips.insert(id, TripAggregate::start(id, started_at_ms));
        state.points.insert(id, Vec::new());
        Ok(id)
    }

    fn append_point(&mut self, trip_id: TripId, point: &ProcessedPoint) -> Result<i64> {
        let mut state = self.lock();
        check_writable(&state)?;
        state.next_point_id += 1;
        let point_id = state.next_point_id;
        let points = state
            .points
            .get_mut(&trip_id)
            .ok_or(TrackerError::TripNotFound(trip_id))?;
        points.push(*point);
        Ok(point_id)
    }

    fn update_trip_aggregate(&mut self, trip_id: TripId, update: &TripUpdate) -> Result<()> {
        let mut state = self.lock();
        check_writable(&state)?;
        let trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or(TrackerError::TripNotFound(trip_id))?;
        update.apply_to(trip);
        Ok(())
    }

    fn mark_completed(&mut self, trip_id: TripId, ended_at_ms: i64) -> Result<()> {
        let mut state = self.lock();
        check_writable(&state)?;
        let trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or(TrackerError::TripNotFound(trip_id))?;
        trip.status = TripStatus::Completed;
        trip.ended_at_ms = Some(ended_at_ms);
        Ok(())
    }

    fn get_active_trip(&self) -> Result<Option<TripAggregate>> {
        Ok(self
            .lock()
            .trips
            .values()
            .rev()
            .find(|t| t.status != TripStatus::Completed)
            .cloned())
    }

    fn get_points_for_trip(&self, trip_id: TripId) -> Result<Vec<ProcessedPoint>> {
        let mut points = self.lock().points.get(&trip_id).cloned().unwrap_or_default();
        points.sort_by_key(|p| p.captured_at_ms);
        Ok(points)
    }

    fn get_trip(&self, trip_id: TripId) -> Result<Option<TripAggregate>> {
        Ok(self.lock().trips.get(&trip_id).cloned())
    }

    fn list_trips(&self) -> Result<Vec<TripAggregate>> {
        let mut trips: Vec<TripAggregate> = self.lock().trips.values().cloned().collect();
        trips.sort_by(|a, b| {
            b.started_at_ms
                .cmp(&a.started_at_ms)
                .then(b.id.cmp(&a.id))
        });
        Ok(trips)
    }

    fn delete_trip(&mut self, trip_id: TripId) -> Result<bool> {
        let mut state = self.lock();
        check_writable(&state)?;
        state.points.remove(&trip_id);
        Ok(state.trips.remove(&trip_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawSample;

    #[test]
    fn test_create_and_read_back() {
        let mut store = MemoryTripStore::new();
        let id = store.create_trip(1_000).unwrap();
        let trip = store.get_trip(id).unwrap().unwrap();
        assert_eq!(trip.started_at_ms, 1_000);
        assert_eq!(trip.status, TripStatus::Active);
        assert_eq!(store.get_active_trip().unwrap().unwrap().id, id);
    }

    #[test]
    fn test_points_ordered_by_capture_time() {
        let mut store = MemoryTripStore::new();
        let id = store.create_trip(0).unwrap();
        for t in [3_000, 1_000, 2_000] {
            let p = ProcessedPoint::from_sample(id, &RawSample::new(0.0, 0.0, t), 0.0);
            store.append_point(id, &p).unwrap();
        }
        let times: Vec<i64> = store
            .get_points_for_trip(id)
            .unwrap()
            .iter()
            .map(|p| p.captured_at_ms)
            .collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn test_completed_trip_not_active() {
        let mut store = MemoryTripStore::new();
        let id = store.create_trip(0).unwrap();
        store.mark_completed(id, 5_000).unwrap();
        assert!(store.get_active_trip().unwrap().is_none());
        assert_eq!(store.get_trip(id).unwrap().unwrap().ended_at_ms, Some(5_000));
    }

    #[test]
    fn test_unknown_trip_errors() {
        let mut store = MemoryTripStore::new();
        let err = store
            .update_trip_aggregate(TripId(99), &TripUpdate::status(TripStatus::Paused))
            .unwrap_err();
        assert_eq!(err, TrackerError::TripNotFound(TripId(99)));
    }

    #[test]
    fn test_failed_writes() {
        let mut store = MemoryTripStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.create_trip(0),
            Err(TrackerError::Persistence { .. })
        ));
        store.set_fail_writes(false);
        assert!(store.create_trip(0).is_ok());
    }

    #[test]
    fn test_list_and_delete() {
        let mut store = MemoryTripStore::new();
        let first = store.create_trip(1_000).unwrap();
        let second = store.create_trip(2_000).unwrap();
        let ids: Vec<TripId> = store.list_trips().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second, first]);

        assert!(store.delete_trip(first).unwrap());
        assert!(!store.delete_trip(first).unwrap());
        assert_eq!(store.list_trips().unwrap().len(), 1);
    }
}
