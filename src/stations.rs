//! Per-station performance tracking and time-of-effort distribution

use std::collections::HashMap;

use crate::error::{CalculationError, Result};
use crate::models::{EffortDistribution, SegmentLog, SegmentType, StationPerformance, StationSample, Trend};

/// HYROX race order of the eight functional stations
pub const HYROX_STATION_ORDER: [&str; 8] = [
    "SkiErg",
    "Sled Push",
    "Sled Pull",
    "Burpee Broad Jumps",
    "Rowing",
    "Farmers Carry",
    "Sandbag Lunges",
    "Wall Balls",
];

/// Station performance aggregation
#[derive(Debug, Clone, Default)]
pub struct StationTracker {
    order: Option<Vec<String>>,
}

impl StationTracker {
    /// Tracker that sorts stations in the given order; unlisted stations
    /// follow alphabetically
    pub fn with_order(order: Vec<String>) -> Self {
        StationTracker { order: Some(order) }
    }

    /// Tracker using the HYROX race order
    pub fn hyrox() -> Self {
        Self::with_order(HYROX_STATION_ORDER.iter().map(|s| s.to_string()).collect())
    }

    /// Best/average/last time, trend and score per station.
    ///
    /// Trend compares the latest effort with the earliest one: `Improving`
    /// when strictly faster, `Declining` otherwise (equal times included).
    /// A station with a single effort is `Stable`.
    pub fn performance(&self, samples: &[StationSample]) -> Result<Vec<StationPerformance>> {
        let mut by_station: HashMap<&str, Vec<&StationSample>> = HashMap::new();
        for sample in samples {
            Self::validate_duration(sample.duration_seconds, "station performance")?;
            by_station
                .entry(sample.station_name.as_str())
                .or_default()
                .push(sample);
        }

        let mut results: Vec<StationPerformance> = by_station
            .into_iter()
            .map(|(name, mut efforts)| {
                efforts.sort_by_key(|effort| effort.timestamp);
                Self::summarize(name, &efforts)
            })
            .collect();

        self.sort(&mut results);
        Ok(results)
    }

    fn summarize(name: &str, efforts: &[&StationSample]) -> StationPerformance {
        let durations: Vec<f64> = efforts.iter().map(|e| e.duration_seconds).collect();

        let best_time = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let average_time = durations.iter().sum::<f64>() / durations.len() as f64;
        let first = durations[0];
        let last_time = durations[durations.len() - 1];

        let trend = if durations.len() < 2 {
            Trend::Stable
        } else if last_time < first {
            Trend::Improving
        } else {
            Trend::Declining
        };

        let score = if average_time > 0.0 {
            (best_time / average_time * 100.0).round().min(100.0) as u8
        } else {
            0
        };

        StationPerformance {
            station_name: name.to_string(),
            best_time,
            average_time,
            last_time,
            trend,
            score,
        }
    }

    fn sort(&self, results: &mut [StationPerformance]) {
        match &self.order {
            Some(order) => {
                let rank = |name: &str| order.iter().position(|s| s == name).unwrap_or(order.len());
                results.sort_by(|a, b| {
                    rank(&a.station_name)
                        .cmp(&rank(&b.station_name))
                        .then_with(|| a.station_name.cmp(&b.station_name))
                });
            }
            None => results.sort_by(|a, b| a.station_name.cmp(&b.station_name)),
        }
    }

    /// Seconds spent running, transitioning and at stations
    pub fn effort_distribution(segments: &[SegmentLog]) -> Result<EffortDistribution> {
        let mut run_seconds = 0.0;
        let mut transition_seconds = 0.0;
        let mut station_seconds = 0.0;
        for segment in segments {
            Self::validate_duration(segment.duration_seconds, "effort distribution")?;
            match segment.segment_type {
                SegmentType::Run => run_seconds += segment.duration_seconds,
                SegmentType::Transition => transition_seconds += segment.duration_seconds,
                SegmentType::Station => station_seconds += segment.duration_seconds,
            }
        }

        let total = run_seconds + transition_seconds + station_seconds;

        let share = |part: f64| if total > 0.0 { part / total * 100.0 } else { 0.0 };

        Ok(EffortDistribution {
            run_seconds,
            transition_seconds,
            station_seconds,
            run_percent: share(run_seconds),
            transition_percent: share(transition_seconds),
            station_percent: share(station_seconds),
        })
    }

    fn validate_duration(seconds: f64, calculation: &str) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CalculationError::invalid(calculation, "duration_seconds", seconds).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn effort(name: &str, seconds: f64, day: i64) -> StationSample {
        StationSample {
            station_name: name.to_string(),
            duration_seconds: seconds,
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap() + Duration::days(day),
        }
    }

    #[test]
    fn test_improving_station() {
        let samples = vec![
            effort("Sled Push", 500.0, 0),
            effort("Sled Push", 480.0, 7),
            effort("Sled Push", 450.0, 14),
        ];
        let results = StationTracker::default().performance(&samples).unwrap();

        assert_eq!(results.len(), 1);
        let sled = &results[0];
        assert_eq!(sled.best_time, 450.0);
        assert!((sled.average_time - 476.666_666).abs() < 1e-3);
        assert_eq!(sled.last_time, 450.0);
        assert_eq!(sled.trend, Trend::Improving);
        assert_eq!(sled.score, 94);
    }

    #[test]
    fn test_chronological_order_not_input_order() {
        let samples = vec![
            effort("Rowing", 240.0, 14),
            effort("Rowing", 260.0, 0),
            effort("Rowing", 230.0, 7),
        ];
        let results = StationTracker::default().performance(&samples).unwrap();
        assert_eq!(results[0].last_time, 240.0);
        assert_eq!(results[0].trend, Trend::Improving);
    }

    #[test]
    fn test_tie_resolves_to_declining() {
        let samples = vec![effort("Wall Balls", 300.0, 0), effort("Wall Balls", 300.0, 3)];
        let results = StationTracker::default().performance(&samples).unwrap();
        assert_eq!(results[0].trend, Trend::Declining);
        assert_eq!(results[0].score, 100);
    }

    #[test]
    fn test_single_effort_is_stable() {
        let results = StationTracker::default()
            .performance(&[effort("SkiErg", 270.0, 0)])
            .unwrap();
        assert_eq!(results[0].trend, Trend::Stable);
    }

    #[test]
    fn test_zero_average_scores_zero() {
        let results = StationTracker::default()
            .performance(&[effort("SkiErg", 0.0, 0)])
            .unwrap();
        assert_eq!(results[0].score, 0);
    }

    #[test]
    fn test_race_order_then_alphabetical() {
        let samples = vec![
            effort("Wall Balls", 300.0, 0),
            effort("Assault Bike", 200.0, 0),
            effort("SkiErg", 260.0, 0),
            effort("Rowing", 250.0, 0),
        ];

        let ordered = StationTracker::hyrox().performance(&samples).unwrap();
        let names: Vec<&str> = ordered.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["SkiErg", "Rowing", "Wall Balls", "Assault Bike"]);

        let alphabetical = StationTracker::default().performance(&samples).unwrap();
        let names: Vec<&str> = alphabetical.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["Assault Bike", "Rowing", "SkiErg", "Wall Balls"]);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = StationTracker::default().performance(&[effort("SkiErg", -1.0, 0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_effort_distribution() {
        let timestamp = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        let segment = |segment_type, seconds| SegmentLog {
            station_name: "x".to_string(),
            segment_type,
            duration_seconds: seconds,
            timestamp,
        };
        let segments = vec![
            segment(SegmentType::Run, 300.0),
            segment(SegmentType::Run, 300.0),
            segment(SegmentType::Transition, 100.0),
            segment(SegmentType::Station, 300.0),
        ];

        let distribution = StationTracker::effort_distribution(&segments).unwrap();
        assert_eq!(distribution.run_seconds, 600.0);
        assert!((distribution.run_percent - 60.0).abs() < 1e-9);
        assert!((distribution.transition_percent - 10.0).abs() < 1e-9);
        assert!((distribution.station_percent - 30.0).abs() < 1e-9);

        let empty = StationTracker::effort_distribution(&[]).unwrap();
        assert_eq!(empty, EffortDistribution::default());
    }
}
