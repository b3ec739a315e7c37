//! Per-user weekly summaries composed from the individual analyzers
//!
//! [`AnalyticsService`] holds only configuration and is shared freely across
//! threads; batch summaries run in parallel with rayon. [`CachedAnalytics`]
//! adds a single-flight cache in front of it for async callers.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{AggregateCache, CacheMetrics};
use crate::config::AppConfig;
use crate::error::{HyroxError, Result};
use crate::models::{
    ActivityKind, EffortDistribution, HeartRateSample, HeartRateZoneDurations, NightlySleepMetrics,
    PaceMetrics, ReadinessScore, SegmentLog, Split, StationPerformance, StationSample,
    UserSnapshot, WeeklyTrainingLoad, WorkoutRecord,
};
use crate::readiness::ReadinessCalculator;
use crate::running::PaceAnalyzer;
use crate::sleep::SleepAnalyzer;
use crate::stations::StationTracker;
use crate::training_load::TrainingLoadAggregator;
use crate::zones::ZoneClassifier;

/// Derived metrics for one workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub workout_id: String,
    pub activity_kind: ActivityKind,
    pub start: DateTime<Utc>,
    pub duration_seconds: f64,
    pub distance_km: f64,
    /// Average pace in s/km, absent without distance
    pub average_pace: Option<f64>,
    pub splits: Vec<Split>,
    pub pace: PaceMetrics,
    pub pace_zone_percentages: [u32; 5],
    pub heart_rate_zones: HeartRateZoneDurations,
    pub average_hr: f64,
    pub max_hr: f64,
}

/// Everything the weekly dashboard shows for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub user_id: String,
    pub reference_date: NaiveDate,
    /// Seven nights ending last night, oldest first
    pub sleep: Vec<NightlySleepMetrics>,
    pub readiness: ReadinessScore,
    pub training_load: WeeklyTrainingLoad,
    /// Workouts of the trailing week, in start order
    pub workouts: Vec<WorkoutSummary>,
    /// Station history across all supplied segments
    pub stations: Vec<StationPerformance>,
    /// Time of effort over the trailing week's segments
    pub effort: EffortDistribution,
}

/// Result of a parallel batch
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub summaries: Vec<WeeklySummary>,
    /// (user id, error message) for snapshots that could not be summarized
    pub errors: Vec<(String, String)>,
}

/// Composes the analyzers configured from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct AnalyticsService {
    offset: FixedOffset,
    max_hr: f64,
    weekly_target_hours: f64,
    sleep: SleepAnalyzer,
    pace: PaceAnalyzer,
    training_load: TrainingLoadAggregator,
    stations: StationTracker,
}

impl AnalyticsService {
    pub fn from_config(config: &AppConfig) -> Self {
        let offset = config.athlete.offset();
        let stations = if config.stations.order.is_empty() {
            StationTracker::default()
        } else {
            StationTracker::with_order(config.stations.order.clone())
        };

        AnalyticsService {
            offset,
            max_hr: config.athlete.max_hr,
            weekly_target_hours: config.athlete.weekly_target_hours,
            sleep: SleepAnalyzer::new(offset, config.sleep.target_hours),
            pace: PaceAnalyzer::new(config.pace.min_plausible_pace, config.pace.max_plausible_pace),
            training_load: TrainingLoadAggregator::new(offset),
            stations,
        }
    }

    pub fn sleep_analyzer(&self) -> &SleepAnalyzer {
        &self.sleep
    }

    pub fn station_tracker(&self) -> &StationTracker {
        &self.stations
    }

    /// Weekly summary for `snapshot` as seen on `today`
    pub fn weekly_summary(&self, snapshot: &UserSnapshot, today: NaiveDate) -> Result<WeeklySummary> {
        let sleep = self.sleep.weekly_report(&snapshot.sleep_samples, today);

        let last_night_quality = sleep
            .last()
            .filter(|night| night.total_hours > 0.0)
            .map(|night| night.quality);
        let readiness = ReadinessCalculator::readiness(
            snapshot.hrv_ms,
            last_night_quality,
            snapshot.resting_hr,
            self.average_hr_on(&snapshot.heart_rate_samples, today),
        )?;

        let training_load =
            self.training_load
                .weekly_load(&snapshot.workouts, self.weekly_target_hours, today)?;

        let max_hr = snapshot.max_hr.unwrap_or(self.max_hr);
        let mut week_workouts: Vec<&WorkoutRecord> = snapshot
            .workouts
            .iter()
            .filter(|w| self.in_trailing_week(self.training_load.workout_day(w), today))
            .collect();
        week_workouts.sort_by_key(|w| w.span.start);

        let workouts = week_workouts
            .into_iter()
            .map(|w| self.workout_summary(w, &snapshot.heart_rate_samples, max_hr))
            .collect::<Result<Vec<_>>>()?;

        let station_samples: Vec<StationSample> = snapshot
            .segments
            .iter()
            .filter_map(SegmentLog::station_sample)
            .collect();
        let stations = self.stations.performance(&station_samples)?;

        let week_segments: Vec<SegmentLog> = snapshot
            .segments
            .iter()
            .filter(|s| self.in_trailing_week(s.timestamp.with_timezone(&self.offset).date_naive(), today))
            .cloned()
            .collect();
        let effort = StationTracker::effort_distribution(&week_segments)?;

        debug!(
            user = %snapshot.user_id,
            workouts = workouts.len(),
            stations = stations.len(),
            readiness = readiness.total,
            "Built weekly summary"
        );

        Ok(WeeklySummary {
            user_id: snapshot.user_id.clone(),
            reference_date: today,
            sleep,
            readiness,
            training_load,
            workouts,
            stations,
            effort,
        })
    }

    /// Per-workout splits, pace statistics and heart-rate zones
    pub fn workout_summary(
        &self,
        workout: &WorkoutRecord,
        heart_rate: &[HeartRateSample],
        max_hr: f64,
    ) -> Result<WorkoutSummary> {
        let during: Vec<HeartRateSample> = heart_rate
            .iter()
            .filter_map(|sample| {
                sample.span.clip_to(&workout.span).map(|span| HeartRateSample {
                    bpm: sample.bpm,
                    span,
                })
            })
            .collect();

        let heart_rate_zones = ZoneClassifier::classify(&during, max_hr)?;
        let (average_hr, peak_hr) = ZoneClassifier::average_and_max(&during);

        let distance_km = workout.distance_km();
        let average_pace = if distance_km > 0.0 {
            Some(workout.duration_seconds() / distance_km)
        } else {
            None
        };

        let splits = self.pace.derive_splits_with_heart_rate(workout, &during);
        let pace = PaceAnalyzer::pace_metrics(&splits, average_pace.unwrap_or(0.0));
        let paces: Vec<f64> = splits.iter().map(|s| s.pace_per_km).collect();

        Ok(WorkoutSummary {
            workout_id: workout.id.clone(),
            activity_kind: workout.activity_kind,
            start: workout.span.start,
            duration_seconds: workout.duration_seconds(),
            distance_km,
            average_pace,
            splits,
            pace,
            pace_zone_percentages: PaceAnalyzer::pace_zone_percentages(&paces),
            heart_rate_zones,
            average_hr,
            max_hr: peak_hr,
        })
    }

    /// Summaries for many users in parallel; failures are collected per user
    pub fn summarize_many(&self, snapshots: &[UserSnapshot], today: NaiveDate) -> BatchSummary {
        let results: Vec<(String, Result<WeeklySummary>)> = snapshots
            .par_iter()
            .map(|snapshot| (snapshot.user_id.clone(), self.weekly_summary(snapshot, today)))
            .collect();

        let mut batch = BatchSummary::default();
        for (user_id, result) in results {
            match result {
                Ok(summary) => batch.summaries.push(summary),
                Err(e) => {
                    warn!(user = %user_id, error = %e, "Failed to summarize user");
                    batch.errors.push((user_id, e.to_string()));
                }
            }
        }

        info!(
            users = snapshots.len(),
            succeeded = batch.summaries.len(),
            failed = batch.errors.len(),
            "Batch summary complete"
        );
        batch
    }

    /// Rounded mean bpm of samples starting on `day`, 0 when there are none
    fn average_hr_on(&self, samples: &[HeartRateSample], day: NaiveDate) -> u32 {
        let todays: Vec<HeartRateSample> = samples
            .iter()
            .filter(|s| s.span.start.with_timezone(&self.offset).date_naive() == day)
            .cloned()
            .collect();
        let (average, _) = ZoneClassifier::average_and_max(&todays);
        average.round() as u32
    }

    fn in_trailing_week(&self, day: NaiveDate, today: NaiveDate) -> bool {
        match today.checked_sub_days(Days::new(6)) {
            Some(first) => day >= first && day <= today,
            None => day <= today,
        }
    }
}

type SummaryKey = (String, NaiveDate);

/// [`AnalyticsService`] behind a single-flight cache keyed by user and day
pub struct CachedAnalytics {
    service: Arc<AnalyticsService>,
    cache: AggregateCache<SummaryKey, Arc<WeeklySummary>>,
}

impl CachedAnalytics {
    pub fn new(service: AnalyticsService) -> Self {
        CachedAnalytics {
            service: Arc::new(service),
            cache: AggregateCache::new(),
        }
    }

    /// Cached weekly summary; the computation runs on the blocking pool
    pub async fn weekly_summary(
        &self,
        snapshot: Arc<UserSnapshot>,
        today: NaiveDate,
    ) -> Result<Arc<WeeklySummary>> {
        let key = (snapshot.user_id.clone(), today);
        let service = Arc::clone(&self.service);

        self.cache
            .get_or_compute(key, || async move {
                tokio::task::spawn_blocking(move || service.weekly_summary(&snapshot, today))
                    .await
                    .map_err(|e| HyroxError::Internal(format!("summary task failed: {}", e)))?
                    .map(Arc::new)
            })
            .await
    }

    /// Drop the cached summary after new data arrived for a user
    pub fn invalidate(&self, user_id: &str, today: NaiveDate) -> Result<bool> {
        self.cache.invalidate(&(user_id.to_string(), today))
    }

    pub fn metrics(&self) -> Result<CacheMetrics> {
        Ok(self.cache.metrics()?.clone())
    }
}
