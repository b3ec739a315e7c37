use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CalculationError, Result};

/// Closed time range with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    /// Create a span, rejecting an end before the start
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(CalculationError::invalid(
                "time span",
                "end",
                format!("{} before start {}", end.to_rfc3339(), start.to_rfc3339()),
            )
            .into());
        }
        Ok(TimeSpan { start, end })
    }

    /// Length of the span in seconds (millisecond precision)
    pub fn duration_seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// True when the spans share at least one instant
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Intersection with `window`, if any
    pub fn clip_to(&self, window: &TimeSpan) -> Option<TimeSpan> {
        if !self.overlaps(window) {
            return None;
        }
        Some(TimeSpan {
            start: self.start.max(window.start),
            end: self.end.min(window.end),
        })
    }
}

/// Sleep stage categories reported by the health-data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SleepCategory {
    AsleepCore,
    AsleepDeep,
    AsleepRem,
    AsleepUnspecified,
}

impl fmt::Display for SleepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepCategory::AsleepCore => write!(f, "Core"),
            SleepCategory::AsleepDeep => write!(f, "Deep"),
            SleepCategory::AsleepRem => write!(f, "REM"),
            SleepCategory::AsleepUnspecified => write!(f, "Unspecified"),
        }
    }
}

/// One categorized sleep sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedSample {
    pub category: SleepCategory,
    pub span: TimeSpan,
}

/// Heart-rate reading over an instant or short window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Beats per minute
    pub bpm: f64,
    pub span: TimeSpan,
}

/// Activity types a workout can be recorded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Running,
    Hyrox,
    Strength,
    Cycling,
    Rowing,
    Other,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Running => "Running",
            ActivityKind::Hyrox => "HYROX",
            ActivityKind::Strength => "Strength",
            ActivityKind::Cycling => "Cycling",
            ActivityKind::Rowing => "Rowing",
            ActivityKind::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

/// Completed workout as recorded by the health-data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    /// Identifier assigned by the recording device or store
    pub id: String,

    pub span: TimeSpan,

    /// Total distance in meters
    pub distance_meters: f64,

    pub activity_kind: ActivityKind,

    /// Lap windows in recording order, possibly empty
    #[serde(default)]
    pub laps: Vec<TimeSpan>,
}

impl WorkoutRecord {
    pub fn duration_seconds(&self) -> f64 {
        self.span.duration_seconds()
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }
}

/// Segment types in a manually logged or generated workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Run,
    Transition,
    Station,
}

/// One logged workout segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentLog {
    pub station_name: String,
    pub segment_type: SegmentType,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl SegmentLog {
    /// Station-tracker view of this segment, only for station segments
    pub fn station_sample(&self) -> Option<StationSample> {
        match self.segment_type {
            SegmentType::Station => Some(StationSample {
                station_name: self.station_name.clone(),
                duration_seconds: self.duration_seconds,
                timestamp: self.timestamp,
            }),
            _ => None,
        }
    }
}

/// A single timed effort at an exercise station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSample {
    pub station_name: String,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-kilometer split of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// 1-based kilometer number
    pub km_index: u32,

    pub duration_seconds: f64,

    /// Pace in seconds per kilometer
    pub pace_per_km: f64,

    /// Average heart rate over the split, when samples cover it
    pub heart_rate: Option<u32>,

    /// Elevation gain in meters
    pub elevation_gain: Option<f64>,
}

/// Sleep summary for one calendar night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightlySleepMetrics {
    /// Date the night started on
    pub night_date: NaiveDate,
    pub total_hours: f64,
    pub deep_hours: f64,
    pub rem_hours: f64,
    /// Quality score (0-100)
    pub quality: u8,
}

impl NightlySleepMetrics {
    /// Metrics for a night without any samples
    pub fn empty(night_date: NaiveDate) -> Self {
        NightlySleepMetrics {
            night_date,
            total_hours: 0.0,
            deep_hours: 0.0,
            rem_hours: 0.0,
            quality: 0,
        }
    }
}

/// Seconds spent in each heart-rate zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRateZoneDurations {
    pub zone1: f64,
    pub zone2: f64,
    pub zone3: f64,
    pub zone4: f64,
    pub zone5: f64,
}

impl HeartRateZoneDurations {
    pub fn as_array(&self) -> [f64; 5] {
        [self.zone1, self.zone2, self.zone3, self.zone4, self.zone5]
    }

    pub fn total_seconds(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Share of total time per zone, all zeros when nothing was sampled
    pub fn percentages(&self) -> [f64; 5] {
        let total = self.total_seconds();
        if total <= 0.0 {
            return [0.0; 5];
        }
        self.as_array().map(|seconds| seconds / total * 100.0)
    }
}

/// Pace statistics over a run's splits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaceMetrics {
    /// Fastest split pace (s/km)
    pub fastest: Option<f64>,
    /// Slowest split pace (s/km)
    pub slowest: Option<f64>,
    /// Coefficient of variation of split paces, lower is more even
    pub consistency_percent: Option<f64>,
    /// Second-half vs first-half pace change, positive means slowed down
    pub fade_factor_percent: Option<f64>,
}

/// Daily readiness composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessScore {
    pub hrv_score: i32,
    pub sleep_contribution: i32,
    pub resting_hr_contribution: i32,
    /// Overall score (0-100)
    pub total: u8,
}

/// Direction of a station's recent results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Improving => write!(f, "Improving"),
            Trend::Declining => write!(f, "Declining"),
            Trend::Stable => write!(f, "Stable"),
        }
    }
}

/// Aggregated results for one exercise station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPerformance {
    pub station_name: String,
    pub best_time: f64,
    pub average_time: f64,
    pub last_time: f64,
    pub trend: Trend,
    /// Best vs average ratio (0-100)
    pub score: u8,
}

/// Training hours on one day of the trailing week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoad {
    /// Short weekday name ("Mon")
    pub day_label: String,
    pub date: NaiveDate,
    pub hours: f64,
    pub is_today: bool,
}

/// Training volume for the trailing seven days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrainingLoad {
    pub target_hours: f64,
    pub current_hours: f64,
    /// Seven entries, index 0 is today
    pub daily_breakdown: Vec<DailyLoad>,
}

/// Time spent per segment type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffortDistribution {
    pub run_seconds: f64,
    pub transition_seconds: f64,
    pub station_seconds: f64,
    pub run_percent: f64,
    pub transition_percent: f64,
    pub station_percent: f64,
}

/// Read-only bundle of one user's raw data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: String,

    #[serde(default)]
    pub sleep_samples: Vec<CategorizedSample>,

    #[serde(default)]
    pub heart_rate_samples: Vec<HeartRateSample>,

    #[serde(default)]
    pub workouts: Vec<WorkoutRecord>,

    #[serde(default)]
    pub segments: Vec<SegmentLog>,

    /// Latest HRV (ms)
    #[serde(default)]
    pub hrv_ms: Option<f64>,

    /// Latest resting heart rate
    #[serde(default)]
    pub resting_hr: Option<u32>,

    /// Measured maximum heart rate, overrides the configured one
    #[serde(default)]
    pub max_hr: Option<f64>,
}

impl UserSnapshot {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserSnapshot {
            user_id: user_id.into(),
            sleep_samples: Vec::new(),
            heart_rate_samples: Vec::new(),
            workouts: Vec::new(),
            segments: Vec::new(),
            hrv_ms: None,
            resting_hr: None,
            max_hr: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_time_span_validation() {
        assert!(TimeSpan::new(at(0), at(10)).is_ok());
        assert!(TimeSpan::new(at(10), at(10)).is_ok());
        assert!(TimeSpan::new(at(10), at(0)).is_err());
    }

    #[test]
    fn test_time_span_clip() {
        let span = TimeSpan::new(at(0), at(100)).unwrap();
        let window = TimeSpan::new(at(50), at(200)).unwrap();
        let clipped = span.clip_to(&window).unwrap();
        assert_eq!(clipped.start, at(50));
        assert_eq!(clipped.end, at(100));

        let outside = TimeSpan::new(at(300), at(400)).unwrap();
        assert!(span.clip_to(&outside).is_none());
    }

    #[test]
    fn test_zone_percentages_empty() {
        let zones = HeartRateZoneDurations::default();
        assert_eq!(zones.percentages(), [0.0; 5]);
    }

    #[test]
    fn test_station_sample_only_for_stations() {
        let mut segment = SegmentLog {
            station_name: "Wall Balls".to_string(),
            segment_type: SegmentType::Station,
            duration_seconds: 300.0,
            timestamp: at(0),
        };
        assert!(segment.station_sample().is_some());

        segment.segment_type = SegmentType::Run;
        assert!(segment.station_sample().is_none());
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let snapshot: UserSnapshot = serde_json::from_str(r#"{"user_id": "u1"}"#).unwrap();
        assert_eq!(snapshot, UserSnapshot::new("u1"));
    }
}
