//! Idempotent workout ingestion
//!
//! Health platforms re-deliver the same workout on retries and from several
//! devices, each time with slightly different timestamps and distances. A
//! candidate is the same workout as a stored one when start, duration and
//! distance all fall within the configured tolerances.
//!
//! Check-then-write is serialized per user and time bucket. A candidate locks
//! every bucket its start-tolerance window touches, always in ascending order,
//! so two imports that could match each other share at least one lock and
//! never deadlock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{DatabaseError, HyroxError, Result};
use crate::models::WorkoutRecord;

pub const DEFAULT_START_TOLERANCE_SECONDS: f64 = 5.0;
pub const DEFAULT_DURATION_TOLERANCE_SECONDS: f64 = 5.0;
pub const DEFAULT_DISTANCE_TOLERANCE_METERS: f64 = 10.0;
pub const DEFAULT_LOCK_BUCKET_SECONDS: i64 = 300;

/// Upper bound on the start tolerance; also bounds the number of lock buckets
pub const MAX_START_TOLERANCE_SECONDS: f64 = 86_400.0;

/// Maximum differences for two records to count as the same workout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateTolerance {
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub distance_meters: f64,
}

impl Default for DuplicateTolerance {
    fn default() -> Self {
        DuplicateTolerance {
            start_seconds: DEFAULT_START_TOLERANCE_SECONDS,
            duration_seconds: DEFAULT_DURATION_TOLERANCE_SECONDS,
            distance_meters: DEFAULT_DISTANCE_TOLERANCE_METERS,
        }
    }
}

/// Tolerance-based duplicate detection
#[derive(Debug, Clone, Default)]
pub struct IdempotencyGuard {
    tolerance: DuplicateTolerance,
}

impl IdempotencyGuard {
    /// Start tolerance is clamped to `0..=MAX_START_TOLERANCE_SECONDS`
    pub fn new(mut tolerance: DuplicateTolerance) -> Self {
        tolerance.start_seconds = if tolerance.start_seconds.is_nan() {
            0.0
        } else {
            tolerance.start_seconds.clamp(0.0, MAX_START_TOLERANCE_SECONDS)
        };
        IdempotencyGuard { tolerance }
    }

    pub fn tolerance(&self) -> &DuplicateTolerance {
        &self.tolerance
    }

    /// True when `candidate` and `existing` describe the same workout
    pub fn is_duplicate(&self, candidate: &WorkoutRecord, existing: &WorkoutRecord) -> bool {
        let start_delta = (candidate.span.start - existing.span.start).num_milliseconds().abs() as f64 / 1000.0;
        let duration_delta = (candidate.duration_seconds() - existing.duration_seconds()).abs();
        let distance_delta = (candidate.distance_meters - existing.distance_meters).abs();

        start_delta <= self.tolerance.start_seconds
            && duration_delta <= self.tolerance.duration_seconds
            && distance_delta <= self.tolerance.distance_meters
    }

    /// First stored record matching `candidate`
    pub fn find_duplicate<'a>(
        &self,
        candidate: &WorkoutRecord,
        existing: &'a [WorkoutRecord],
    ) -> Option<&'a WorkoutRecord> {
        existing.iter().find(|record| self.is_duplicate(candidate, record))
    }

    /// Start-time window a matching record must start in
    pub fn search_window(&self, candidate: &WorkoutRecord) -> (DateTime<Utc>, DateTime<Utc>) {
        let tolerance = Duration::milliseconds((self.tolerance.start_seconds * 1000.0).ceil() as i64);
        let start = candidate.span.start;
        (
            start.checked_sub_signed(tolerance).unwrap_or(DateTime::<Utc>::MIN_UTC),
            start.checked_add_signed(tolerance).unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

/// Persistence collaborator for ingested workouts
pub trait WorkoutStore: Send + Sync {
    /// Workouts of `user_id` starting within `[from, to]`
    fn workouts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkoutRecord>>;

    fn insert_workout(&self, user_id: &str, workout: &WorkoutRecord) -> Result<()>;
}

/// Process-local workout store
#[derive(Debug, Default)]
pub struct InMemoryWorkoutStore {
    workouts: RwLock<HashMap<String, Vec<WorkoutRecord>>>,
}

impl InMemoryWorkoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workouts stored for `user_id`
    pub fn count(&self, user_id: &str) -> Result<usize> {
        let workouts = self.workouts.read().map_err(|_| poisoned("in-memory workouts"))?;
        Ok(workouts.get(user_id).map_or(0, Vec::len))
    }
}

impl WorkoutStore for InMemoryWorkoutStore {
    fn workouts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkoutRecord>> {
        let workouts = self.workouts.read().map_err(|_| poisoned("in-memory workouts"))?;
        Ok(workouts
            .get(user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|w| w.span.start >= from && w.span.start <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_workout(&self, user_id: &str, workout: &WorkoutRecord) -> Result<()> {
        let mut workouts = self.workouts.write().map_err(|_| poisoned("in-memory workouts"))?;
        workouts
            .entry(user_id.to_string())
            .or_default()
            .push(workout.clone());
        Ok(())
    }
}

/// Result of ingesting one workout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    Inserted { id: String },
    Duplicate { existing_id: String },
}

/// Counts from a batch ingest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

type LockKey = (String, i64);

/// Check-then-write ingestion over a [`WorkoutStore`]
pub struct IngestionService<S: WorkoutStore> {
    store: S,
    guard: IdempotencyGuard,
    bucket_seconds: i64,
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl<S: WorkoutStore> IngestionService<S> {
    /// Non-positive bucket widths fall back to 300 s
    pub fn new(store: S, guard: IdempotencyGuard, bucket_seconds: i64) -> Self {
        let bucket_seconds = if bucket_seconds > 0 {
            bucket_seconds
        } else {
            DEFAULT_LOCK_BUCKET_SECONDS
        };
        IngestionService {
            store,
            guard,
            bucket_seconds,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store `workout` for `user_id` unless an equivalent record exists
    pub fn ingest(&self, user_id: &str, workout: &WorkoutRecord) -> Result<IngestOutcome> {
        let (from, to) = self.guard.search_window(workout);
        let handles = self.lock_handles(user_id, from, to)?;

        let outcome = {
            let _held = handles
                .iter()
                .map(|handle| handle.lock().map_err(|_| poisoned("ingestion bucket")))
                .collect::<Result<Vec<_>>>()?;
            self.check_then_write(user_id, workout, from, to)
        };

        drop(handles);
        self.prune_idle_locks()?;
        outcome
    }

    /// Ingest a batch in order, stopping at the first store error
    pub fn ingest_all(&self, user_id: &str, workouts: &[WorkoutRecord]) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        for workout in workouts {
            match self.ingest(user_id, workout)? {
                IngestOutcome::Inserted { .. } => summary.inserted += 1,
                IngestOutcome::Duplicate { .. } => summary.duplicates += 1,
            }
        }
        Ok(summary)
    }

    /// Lock entries currently held or awaited
    pub fn active_locks(&self) -> Result<usize> {
        Ok(self.locks.lock().map_err(|_| poisoned("ingestion lock table"))?.len())
    }

    fn check_then_write(
        &self,
        user_id: &str,
        workout: &WorkoutRecord,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let nearby = self.store.workouts_between(user_id, from, to)?;

        if let Some(existing) = self.guard.find_duplicate(workout, &nearby) {
            info!(
                user = user_id,
                candidate = %workout.id,
                existing = %existing.id,
                "Skipping duplicate workout"
            );
            return Ok(IngestOutcome::Duplicate {
                existing_id: existing.id.clone(),
            });
        }

        self.store.insert_workout(user_id, workout)?;
        info!(user = user_id, workout = %workout.id, kind = %workout.activity_kind, "Ingested workout");
        Ok(IngestOutcome::Inserted {
            id: workout.id.clone(),
        })
    }

    /// Bucket indices covering `[from, to]`, ascending
    fn buckets(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> std::ops::RangeInclusive<i64> {
        let first = from.timestamp().div_euclid(self.bucket_seconds);
        let last = to.timestamp().div_euclid(self.bucket_seconds);
        first..=last
    }

    fn lock_handles(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Arc<Mutex<()>>>> {
        let mut locks = self.locks.lock().map_err(|_| poisoned("ingestion lock table"))?;
        let handles: Vec<_> = self
            .buckets(from, to)
            .map(|bucket| {
                locks
                    .entry((user_id.to_string(), bucket))
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            })
            .collect();
        debug!(user = user_id, buckets = handles.len(), "Acquired ingestion lock handles");
        Ok(handles)
    }

    fn prune_idle_locks(&self) -> Result<()> {
        let mut locks = self.locks.lock().map_err(|_| poisoned("ingestion lock table"))?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(())
    }
}

fn poisoned(store: &str) -> HyroxError {
    DatabaseError::LockPoisoned {
        store: store.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, TimeSpan};
    use chrono::TimeZone;

    fn workout(id: &str, start_offset: i64, duration: i64, distance: f64) -> WorkoutRecord {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap() + Duration::seconds(start_offset);
        WorkoutRecord {
            id: id.to_string(),
            span: TimeSpan::new(start, start + Duration::seconds(duration)).unwrap(),
            distance_meters: distance,
            activity_kind: ActivityKind::Running,
            laps: Vec::new(),
        }
    }

    #[test]
    fn test_near_identical_records_are_duplicates() {
        let guard = IdempotencyGuard::default();
        let stored = workout("watch", 0, 3600, 10_000.0);
        let retry = workout("phone", 3, 3602, 10_004.0);
        assert!(guard.is_duplicate(&retry, &stored));
    }

    #[test]
    fn test_each_tolerance_is_enforced() {
        let guard = IdempotencyGuard::default();
        let stored = workout("a", 0, 3600, 10_000.0);

        assert!(guard.is_duplicate(&workout("b", 5, 3605, 10_010.0), &stored));
        assert!(!guard.is_duplicate(&workout("b", 6, 3600, 10_000.0), &stored));
        assert!(!guard.is_duplicate(&workout("b", 0, 3606, 10_000.0), &stored));
        assert!(!guard.is_duplicate(&workout("b", 0, 3600, 10_011.0), &stored));
    }

    #[test]
    fn test_custom_tolerance() {
        let guard = IdempotencyGuard::new(DuplicateTolerance {
            start_seconds: 60.0,
            duration_seconds: 60.0,
            distance_meters: 100.0,
        });
        let stored = workout("a", 0, 3600, 10_000.0);
        assert!(guard.is_duplicate(&workout("b", 45, 3650, 10_080.0), &stored));
    }

    #[test]
    fn test_find_duplicate_returns_match() {
        let guard = IdempotencyGuard::default();
        let existing = vec![workout("morning", -7200, 1800, 5000.0), workout("main", 0, 3600, 10_000.0)];
        let found = guard.find_duplicate(&workout("retry", 2, 3600, 10_000.0), &existing);
        assert_eq!(found.map(|w| w.id.as_str()), Some("main"));
        assert!(guard.find_duplicate(&workout("new", 900, 3600, 10_000.0), &existing).is_none());
    }

    #[test]
    fn test_retry_is_a_noop() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 300);

        let first = service.ingest("athlete", &workout("watch", 0, 3600, 10_000.0)).unwrap();
        assert_eq!(first, IngestOutcome::Inserted { id: "watch".to_string() });

        let second = service.ingest("athlete", &workout("phone", 3, 3602, 10_004.0)).unwrap();
        assert_eq!(
            second,
            IngestOutcome::Duplicate {
                existing_id: "watch".to_string()
            }
        );
        assert_eq!(service.store().count("athlete").unwrap(), 1);
    }

    #[test]
    fn test_users_are_isolated() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 300);
        let record = workout("w", 0, 3600, 10_000.0);

        service.ingest("alice", &record).unwrap();
        let outcome = service.ingest("bob", &record).unwrap();
        assert!(matches!(outcome, IngestOutcome::Inserted { .. }));
    }

    #[test]
    fn test_ingest_all_counts() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 300);
        let batch = vec![
            workout("a", 0, 3600, 10_000.0),
            workout("a-retry", 1, 3600, 10_000.0),
            workout("b", 86_400, 1800, 5000.0),
        ];
        let summary = service.ingest_all("athlete", &batch).unwrap();
        assert_eq!(summary, IngestSummary { inserted: 2, duplicates: 1 });
    }

    #[test]
    fn test_concurrent_retries_insert_once() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 300);

        // Start 299 s into a bucket so the tolerance window straddles a boundary
        std::thread::scope(|scope| {
            for i in 0..8 {
                let service = &service;
                scope.spawn(move || {
                    let candidate = workout(&format!("device-{}", i), 299 + (i % 3), 3600, 10_000.0);
                    service.ingest("athlete", &candidate).unwrap();
                });
            }
        });

        assert_eq!(service.store().count("athlete").unwrap(), 1);
        assert_eq!(service.active_locks().unwrap(), 0);
    }

    #[test]
    fn test_buckets_cover_window() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 300);
        let from = Utc.timestamp_opt(598, 0).unwrap();
        let to = Utc.timestamp_opt(608, 0).unwrap();
        assert_eq!(service.buckets(from, to).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_oversized_start_tolerance_is_clamped() {
        let guard = IdempotencyGuard::new(DuplicateTolerance {
            start_seconds: 1e15,
            ..DuplicateTolerance::default()
        });
        assert_eq!(guard.tolerance().start_seconds, MAX_START_TOLERANCE_SECONDS);

        let candidate = workout("run", 0, 3600, 10_000.0);
        let (from, to) = guard.search_window(&candidate);
        assert_eq!(to - from, Duration::days(2));

        let service = IngestionService::new(InMemoryWorkoutStore::new(), guard, 300);
        assert_eq!(service.buckets(from, to).count(), 577);
    }

    #[test]
    fn test_window_saturates_at_calendar_edge() {
        let guard = IdempotencyGuard::new(DuplicateTolerance {
            start_seconds: MAX_START_TOLERANCE_SECONDS,
            ..DuplicateTolerance::default()
        });
        let start = DateTime::<Utc>::MAX_UTC - Duration::seconds(60);
        let candidate = WorkoutRecord {
            id: "edge".to_string(),
            span: TimeSpan::new(start, start + Duration::seconds(30)).unwrap(),
            distance_meters: 0.0,
            activity_kind: ActivityKind::Running,
            laps: Vec::new(),
        };

        let (from, to) = guard.search_window(&candidate);
        assert_eq!(from, start - Duration::days(1));
        assert_eq!(to, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_non_positive_bucket_width_falls_back() {
        let service = IngestionService::new(InMemoryWorkoutStore::new(), IdempotencyGuard::default(), 0);
        assert_eq!(service.bucket_seconds, DEFAULT_LOCK_BUCKET_SECONDS);
    }
}
