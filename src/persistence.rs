//! # SQLite Trip Store
//!
//! Durable [`TripStore`] backed by SQLite.
//!
//! ## Tables
//!
//! - **trips**: one row per trip with its running totals and status
//! - **trip_points**: append-only accepted points, cascaded on trip delete

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, TrackerError};
use crate::store::TripStore;
use crate::types::{ProcessedPoint, TripAggregate, TripId, TripStatus, TripUpdate};

const TRIP_COLUMNS: &str = "id, started_at_ms, ended_at_ms, total_distance_meters,
     max_speed_kmh, avg_speed_kmh, status";

/// SQLite-backed trip store.
pub struct SqliteTripStore {
    db: Connection,
    db_path: String,
}

impl SqliteTripStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[SqliteTripStore] Opened {}", db_path);
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Trip summaries
            CREATE TABLE IF NOT EXISTS trips (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at_ms INTEGER NOT NULL,
                ended_at_ms INTEGER,
                total_distance_meters REAL NOT NULL DEFAULT 0,
                max_speed_kmh REAL NOT NULL DEFAULT 0,
                avg_speed_kmh REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active'
            );

            -- Accepted points (append-only)
            CREATE TABLE IF NOT EXISTS trip_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id INTEGER NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                speed_kmh REAL NOT NULL,
                altitude REAL,
                accuracy REAL,
                captured_at_ms INTEGER NOT NULL,
                FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_trips_status ON trips(status);
            CREATE INDEX IF NOT EXISTS idx_trip_points_trip_time ON trip_points(trip_id, captured_at_ms);
        "#,
        )?;
        Ok(())
    }

    fn trip_from_row(row: &Row<'_>) -> rusqlite::Result<TripAggregate> {
        let status_text: String = row.get(6)?;
        let status = TripStatus::parse(&status_text).unwrap_or_else(|| {
            warn!(
                "[SqliteTripStore] Unknown trip status '{}', treating as completed",
                status_text
            );
            TripStatus::Completed
        });

        Ok(TripAggregate {
            id: TripId(row.get(0)?),
            started_at_ms: row.get(1)?,
            ended_at_ms: row.get(2)?,
            total_distance_meters: row.get(3)?,
            max_speed_kmh: row.get(4)?,
            avg_speed_kmh: row.get(5)?,
            status,
        })
    }

    fn point_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessedPoint> {
        Ok(ProcessedPoint {
            trip_id: TripId(row.get(0)?),
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            speed_kmh: row.get(3)?,
            altitude: row.get(4)?,
            accuracy: row.get(5)?,
            captured_at_ms: row.get(6)?,
        })
    }

    /// Number of stored points for a trip.
    pub fn point_count(&self, trip_id: TripId) -> Result<u32> {
        let count: u32 = self.db.query_row(
            "SELECT COUNT(*) FROM trip_points WHERE trip_id = ?1",
            params![trip_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl TripStore for SqliteTripStore {
    fn create_trip(&mut self, started_at_ms: i64) -> Result<TripId> {
        self.db.execute(
            "INSERT INTO trips (started_at_ms, status) VALUES (?1, ?2)",
            params![started_at_ms, TripStatus::Active.as_str()],
        )?;
        Ok(TripId(self.db.last_insert_rowid()))
    }

    fn append_point(&mut self, trip_id: TripId, point: &ProcessedPoint) -> Result<i64> {
        self.db.execute(
            "INSERT INTO trip_points
                (trip_id, latitude, longitude, speed_kmh, altitude, accuracy, captured_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                trip_id.0,
                point.latitude,
                point.longitude,
                point.speed_kmh,
                point.altitude,
                point.accuracy,
                point.captured_at_ms,
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    fn update_trip_aggregate(&mut self, trip_id: TripId, update: &TripUpdate) -> Result<()> {
        let changed = self.db.execute(
            "UPDATE trips SET
                total_distance_meters = COALESCE(?1, total_distance_meters),
                max_speed_kmh = COALESCE(?2, max_speed_kmh),
                avg_speed_kmh = COALESCE(?3, avg_speed_kmh),
                status = COALESCE(?4, status),
                ended_at_ms = COALESCE(?5, ended_at_ms)
             WHERE id = ?6",
            params![
                update.total_distance_meters,
                update.max_speed_kmh,
                update.avg_speed_kmh,
                update.status.map(|s| s.as_str()),
                update.ended_at_ms,
                trip_id.0,
            ],
        )?;
        if changed == 0 {
            return Err(TrackerError::TripNotFound(trip_id));
        }
        Ok(())
    }

    fn mark_completed(&mut self, trip_id: TripId, ended_at_ms: i64) -> Result<()> {
        let changed = self.db.execute(
            "UPDATE trips SET status = ?1, ended_at_ms = ?2 WHERE id = ?3",
            params![TripStatus::Completed.as_str(), ended_at_ms, trip_id.0],
        )?;
        if changed == 0 {
            return Err(TrackerError::TripNotFound(trip_id));
        }
        Ok(())
    }

    fn get_active_trip(&self) -> Result<Option<TripAggregate>> {
        let sql = format!(
            "SELECT {} FROM trips WHERE status != ?1 ORDER BY id DESC LIMIT 1",
            TRIP_COLUMNS
        );
        let trip = self
            .db
            .query_row(
                &sql,
                params![TripStatus::Completed.as_str()],
                Self::trip_from_row,
            )
            .optional()?;
        Ok(trip)
    }

    fn get_points_for_trip(&self, trip_id: TripId) -> Result<Vec<ProcessedPoint>> {
        let mut stmt = self.db.prepare(
            "SELECT trip_id, latitude, longitude, speed_kmh, altitude, accuracy, captured_at_ms
             FROM trip_points WHERE trip_id = ?1
             ORDER BY captured_at_ms, id",
        )?;
        let points = stmt
            .query_map(params![trip_id.0], Self::point_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    fn get_trip(&self, trip_id: TripId) -> Result<Option<TripAggregate>> {
        let sql = format!("SELECT {} FROM trips WHERE id = ?1", TRIP_COLUMNS);
        let trip = self
            .db
            .query_row(&sql, params![trip_id.0], Self::trip_from_row)
            .optional()?;
        Ok(trip)
    }

    fn list_trips(&self) -> Result<Vec<TripAggregate>> {
        let sql = format!(
            "SELECT {} FROM trips ORDER BY started_at_ms DESC, id DESC",
            TRIP_COLUMNS
        );
        let mut stmt = self.db.prepare(&sql)?;
        let trips = stmt
            .query_map([], Self::trip_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trips)
    }

    fn delete_trip(&mut self, trip_id: TripId) -> Result<bool> {
        let changed = self
            .db
            .execute("DELETE FROM trips WHERE id = ?1", params![trip_id.0])?;
        if changed > 0 {
            info!("[SqliteTripStore] Deleted trip {}", trip_id);
        }
        Ok(changed > 0)
    }
}
