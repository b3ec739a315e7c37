use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{DatabaseError, HyroxError, Result};
use crate::ingestion::WorkoutStore;
use crate::models::{ActivityKind, NightlySleepMetrics, TimeSpan, WorkoutRecord};

/// SQLite-backed store for ingested workouts and nightly sleep metrics
pub struct SqliteWorkoutStore {
    conn: Mutex<Connection>,
}

/// Row counts for `hyroxrs ingest` reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub workout_count: usize,
    pub user_count: usize,
    pub sleep_night_count: usize,
}

impl SqliteWorkoutStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| DatabaseError::ConnectionFailed {
            reason: format!("{}: {}", db_path.as_ref().display(), e),
        })?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| DatabaseError::ConnectionFailed {
            reason: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = SqliteWorkoutStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            HyroxError::from(DatabaseError::LockPoisoned {
                store: "sqlite".to_string(),
            })
        })
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS workouts (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                distance_meters REAL NOT NULL,
                activity_kind TEXT NOT NULL,
                laps TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_workouts_user_start ON workouts(user_id, start_ms);

            CREATE TABLE IF NOT EXISTS sleep_nights (
                user_id TEXT NOT NULL,
                night_date DATE NOT NULL,
                total_hours REAL NOT NULL,
                deep_hours REAL NOT NULL,
                rem_hours REAL NOT NULL,
                quality INTEGER NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, night_date)
            );
            "#,
        )?;

        Ok(())
    }

    /// Load a workout by ID
    pub fn load_workout(&self, user_id: &str, workout_id: &str) -> Result<Option<WorkoutRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, start_ms, end_ms, distance_meters, activity_kind, laps
                FROM workouts
                WHERE user_id = ?1 AND id = ?2
                "#,
                params![user_id, workout_id],
                WorkoutRow::from_row,
            )
            .optional()?;

        row.map(WorkoutRow::into_record).transpose()
    }

    /// Upsert sleep metrics, replacing any earlier computation for the same night
    pub fn store_nightly_sleep(&self, user_id: &str, nights: &[NightlySleepMetrics]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for night in nights {
            tx.execute(
                r#"
                INSERT INTO sleep_nights (user_id, night_date, total_hours, deep_hours, rem_hours, quality)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(user_id, night_date) DO UPDATE SET
                    total_hours = excluded.total_hours,
                    deep_hours = excluded.deep_hours,
                    rem_hours = excluded.rem_hours,
                    quality = excluded.quality,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    user_id,
                    night.night_date.to_string(),
                    night.total_hours,
                    night.deep_hours,
                    night.rem_hours,
                    night.quality,
                ],
            )?;
        }

        tx.commit()?;
        debug!(user = user_id, nights = nights.len(), "Stored nightly sleep metrics");
        Ok(())
    }

    /// Stored nights for a user, oldest first
    pub fn load_nightly_sleep(&self, user_id: &str) -> Result<Vec<NightlySleepMetrics>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT night_date, total_hours, deep_hours, rem_hours, quality
            FROM sleep_nights
            WHERE user_id = ?1
            ORDER BY night_date
            "#,
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, u8>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(date, total_hours, deep_hours, rem_hours, quality)| {
                let night_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| corrupt("sleep_nights", e))?;
                Ok(NightlySleepMetrics {
                    night_date,
                    total_hours,
                    deep_hours,
                    rem_hours,
                    quality,
                })
            })
            .collect()
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;

        let workout_count: i64 = conn.query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))?;
        let user_count: i64 =
            conn.query_row("SELECT COUNT(DISTINCT user_id) FROM workouts", [], |row| row.get(0))?;
        let sleep_night_count: i64 = conn.query_row("SELECT COUNT(*) FROM sleep_nights", [], |row| row.get(0))?;

        Ok(StoreStats {
            workout_count: workout_count as usize,
            user_count: user_count as usize,
            sleep_night_count: sleep_night_count as usize,
        })
    }
}

impl WorkoutStore for SqliteWorkoutStore {
    fn workouts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkoutRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, start_ms, end_ms, distance_meters, activity_kind, laps
            FROM workouts
            WHERE user_id = ?1 AND start_ms BETWEEN ?2 AND ?3
            ORDER BY start_ms
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![user_id, from.timestamp_millis(), to.timestamp_millis()],
                WorkoutRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(WorkoutRow::into_record).collect()
    }

    fn insert_workout(&self, user_id: &str, workout: &WorkoutRecord) -> Result<()> {
        let laps = serde_json::to_string(&workout.laps).map_err(|e| corrupt("workouts", e))?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO workouts (id, user_id, start_ms, end_ms, distance_meters, activity_kind, laps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                workout.id,
                user_id,
                workout.span.start.timestamp_millis(),
                workout.span.end.timestamp_millis(),
                workout.distance_meters,
                activity_kind_to_str(workout.activity_kind),
                laps,
            ],
        )?;

        Ok(())
    }
}

/// Raw column values before decoding into the domain model
struct WorkoutRow {
    id: String,
    start_ms: i64,
    end_ms: i64,
    distance_meters: f64,
    activity_kind: String,
    laps: String,
}

impl WorkoutRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WorkoutRow {
            id: row.get(0)?,
            start_ms: row.get(1)?,
            end_ms: row.get(2)?,
            distance_meters: row.get(3)?,
            activity_kind: row.get(4)?,
            laps: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<WorkoutRecord> {
        let start = timestamp_from_millis(self.start_ms)?;
        let end = timestamp_from_millis(self.end_ms)?;
        let span = TimeSpan::new(start, end).map_err(|e| corrupt("workouts", e))?;
        let laps: Vec<TimeSpan> = serde_json::from_str(&self.laps).map_err(|e| corrupt("workouts", e))?;

        Ok(WorkoutRecord {
            id: self.id,
            span,
            distance_meters: self.distance_meters,
            activity_kind: activity_kind_from_str(&self.activity_kind)?,
            laps,
        })
    }
}

fn timestamp_from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt("workouts", format!("timestamp out of range: {}", ms)))
}

fn activity_kind_to_str(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Running => "running",
        ActivityKind::Hyrox => "hyrox",
        ActivityKind::Strength => "strength",
        ActivityKind::Cycling => "cycling",
        ActivityKind::Rowing => "rowing",
        ActivityKind::Other => "other",
    }
}

fn activity_kind_from_str(s: &str) -> Result<ActivityKind> {
    match s {
        "running" => Ok(ActivityKind::Running),
        "hyrox" => Ok(ActivityKind::Hyrox),
        "strength" => Ok(ActivityKind::Strength),
        "cycling" => Ok(ActivityKind::Cycling),
        "rowing" => Ok(ActivityKind::Rowing),
        "other" => Ok(ActivityKind::Other),
        _ => Err(corrupt("workouts", format!("unknown activity kind: {}", s))),
    }
}

fn corrupt(table: &str, reason: impl ToString) -> HyroxError {
    DatabaseError::CorruptRecord {
        table: table.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
