//! Sleep analysis
//!
//! Groups categorized sleep samples into calendar nights, merges overlapping
//! stage intervals per night and scores each night's quality.
//!
//! # Night assignment
//!
//! A sample belongs to the night dated one day before the calendar day its
//! end timestamp falls on, in the analyzer's UTC offset. Sleep ending at 07:00
//! on day D is "the night of D-1", and a sample that started before midnight
//! stays with the same night as one that started after it.
//!
//! # Quality score
//!
//! - Duration (50%): `1 - |total - target| / target`, clamped to [0, 1]
//! - Deep share (25%): full marks for 13-23% of total sleep, half otherwise
//! - REM share (25%): full marks for 20-25% of total sleep, half otherwise
//!
//! A night with no sleep at all scores 0.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Offset, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::intervals::IntervalMerger;
use crate::models::{CategorizedSample, NightlySleepMetrics, SleepCategory, TimeSpan};

/// Healthy deep sleep share of total sleep (percent)
pub const DEEP_SLEEP_BAND: (f64, f64) = (13.0, 23.0);

/// Healthy REM share of total sleep (percent)
pub const REM_SLEEP_BAND: (f64, f64) = (20.0, 25.0);

pub const DEFAULT_TARGET_HOURS: f64 = 8.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Per-night interval sets before merging
#[derive(Default)]
struct NightSpans {
    total: Vec<TimeSpan>,
    deep: Vec<TimeSpan>,
    rem: Vec<TimeSpan>,
}

impl NightSpans {
    fn push(&mut self, category: SleepCategory, span: TimeSpan) {
        self.total.push(span);
        match category {
            SleepCategory::AsleepDeep => self.deep.push(span),
            SleepCategory::AsleepRem => self.rem.push(span),
            SleepCategory::AsleepCore | SleepCategory::AsleepUnspecified => {}
        }
    }
}

/// Sleep analyzer configured with the user's UTC offset and sleep target
#[derive(Debug, Clone)]
pub struct SleepAnalyzer {
    offset: FixedOffset,
    target_hours: f64,
}

impl Default for SleepAnalyzer {
    fn default() -> Self {
        SleepAnalyzer {
            offset: Utc.fix(),
            target_hours: DEFAULT_TARGET_HOURS,
        }
    }
}

impl SleepAnalyzer {
    /// Non-positive targets fall back to the default 8 hours
    pub fn new(offset: FixedOffset, target_hours: f64) -> Self {
        let target_hours = if target_hours.is_finite() && target_hours > 0.0 {
            target_hours
        } else {
            DEFAULT_TARGET_HOURS
        };
        SleepAnalyzer {
            offset,
            target_hours,
        }
    }

    /// Night a sample ending at `end` belongs to
    pub fn night_of(&self, end: DateTime<Utc>) -> NaiveDate {
        let day = end.with_timezone(&self.offset).date_naive();
        day.pred_opt().unwrap_or(day)
    }

    /// Seven nights ending with the night before `reference_date`, oldest first.
    ///
    /// Nights without samples are reported with all-zero metrics.
    pub fn weekly_report(
        &self,
        samples: &[CategorizedSample],
        reference_date: NaiveDate,
    ) -> Vec<NightlySleepMetrics> {
        let nights: Vec<NaiveDate> = (1..=7u64)
            .rev()
            .filter_map(|back| reference_date.checked_sub_days(Days::new(back)))
            .collect();

        let mut grouped: HashMap<NaiveDate, NightSpans> = HashMap::new();
        for sample in samples {
            let night = self.night_of(sample.span.end);
            if nights.contains(&night) {
                grouped
                    .entry(night)
                    .or_default()
                    .push(sample.category, sample.span);
            }
        }

        debug!(
            samples = samples.len(),
            nights_with_data = grouped.len(),
            %reference_date,
            "Built weekly sleep report"
        );

        nights
            .into_iter()
            .map(|night| match grouped.get(&night) {
                Some(spans) => self.summarize(night, spans),
                None => NightlySleepMetrics::empty(night),
            })
            .collect()
    }

    /// Metrics for the samples falling inside `night_window`.
    ///
    /// Samples are clipped to the window before merging.
    pub fn nightly_report(
        &self,
        samples: &[CategorizedSample],
        night_window: &TimeSpan,
    ) -> NightlySleepMetrics {
        let night = self.night_of(night_window.end);
        let mut spans = NightSpans::default();

        for sample in samples {
            if let Some(clipped) = sample.span.clip_to(night_window) {
                spans.push(sample.category, clipped);
            }
        }

        self.summarize(night, &spans)
    }

    /// Quality score (0-100) for one night
    pub fn quality_score(&self, total_hours: f64, deep_hours: f64, rem_hours: f64) -> u8 {
        if total_hours <= 0.0 {
            return 0;
        }

        let total_score =
            (1.0 - (total_hours - self.target_hours).abs() / self.target_hours).clamp(0.0, 1.0);

        let deep_percent = deep_hours / total_hours * 100.0;
        let rem_percent = rem_hours / total_hours * 100.0;

        let deep_score = band_score(deep_percent, DEEP_SLEEP_BAND);
        let rem_score = band_score(rem_percent, REM_SLEEP_BAND);

        let quality = (total_score * 0.5 + deep_score * 0.25 + rem_score * 0.25) * 100.0;
        quality.round().clamp(0.0, 100.0) as u8
    }

    fn summarize(&self, night: NaiveDate, spans: &NightSpans) -> NightlySleepMetrics {
        let total_hours = IntervalMerger::total_duration(&spans.total) / SECONDS_PER_HOUR;
        if total_hours <= 0.0 {
            return NightlySleepMetrics::empty(night);
        }

        let deep_hours = IntervalMerger::total_duration(&spans.deep) / SECONDS_PER_HOUR;
        let rem_hours = IntervalMerger::total_duration(&spans.rem) / SECONDS_PER_HOUR;

        NightlySleepMetrics {
            night_date: night,
            total_hours,
            deep_hours,
            rem_hours,
            quality: self.quality_score(total_hours, deep_hours, rem_hours),
        }
    }
}

fn band_score(percent: f64, (low, high): (f64, f64)) -> f64 {
    if percent >= low && percent <= high {
        1.0
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(category: SleepCategory, start: DateTime<Utc>, minutes: i64) -> CategorizedSample {
        CategorizedSample {
            category,
            span: TimeSpan::new(start, start + Duration::minutes(minutes)).unwrap(),
        }
    }

    /// 8h night starting 23:00 on `day`: 282 min core, 90 min deep, 108 min REM
    fn ideal_night(day: NaiveDate) -> Vec<CategorizedSample> {
        let bedtime = Utc.from_utc_datetime(&day.and_hms_opt(23, 0, 0).unwrap());
        let deep_start = bedtime + Duration::minutes(282);
        let rem_start = deep_start + Duration::minutes(90);
        vec![
            sample(SleepCategory::AsleepCore, bedtime, 282),
            sample(SleepCategory::AsleepDeep, deep_start, 90),
            sample(SleepCategory::AsleepRem, rem_start, 108),
        ]
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_ideal_night_scores_100() {
        let analyzer = SleepAnalyzer::default();
        let report = analyzer.weekly_report(&ideal_night(date(10)), date(11));
        let night = report.last().unwrap();

        assert_eq!(night.night_date, date(10));
        assert!((night.total_hours - 8.0).abs() < 1e-9);
        assert!((night.deep_hours - 1.5).abs() < 1e-9);
        assert!((night.rem_hours - 1.8).abs() < 1e-9);
        assert_eq!(night.quality, 100);
    }

    #[test]
    fn test_weekly_report_always_has_seven_nights() {
        let analyzer = SleepAnalyzer::default();
        let report = analyzer.weekly_report(&[], date(15));

        assert_eq!(report.len(), 7);
        assert_eq!(report[0].night_date, date(8));
        assert_eq!(report[6].night_date, date(14));
        assert!(report.iter().all(|n| n.quality == 0 && n.total_hours == 0.0));
    }

    #[test]
    fn test_samples_outside_week_ignored() {
        let analyzer = SleepAnalyzer::default();
        let mut samples = ideal_night(date(1));
        samples.extend(ideal_night(date(12)));

        let report = analyzer.weekly_report(&samples, date(15));
        let with_sleep: Vec<_> = report.iter().filter(|n| n.total_hours > 0.0).collect();
        assert_eq!(with_sleep.len(), 1);
        assert_eq!(with_sleep[0].night_date, date(12));
    }

    #[test]
    fn test_overlapping_devices_not_double_counted() {
        let analyzer = SleepAnalyzer::default();
        let mut samples = ideal_night(date(10));
        // A second device reporting the same night as unspecified sleep
        let bedtime = Utc.from_utc_datetime(&date(10).and_hms_opt(23, 30, 0).unwrap());
        samples.push(sample(SleepCategory::AsleepUnspecified, bedtime, 300));

        let report = analyzer.weekly_report(&samples, date(11));
        assert!((report[6].total_hours - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_night_assignment_uses_end_date() {
        let analyzer = SleepAnalyzer::default();
        let end = Utc.with_ymd_and_hms(2024, 3, 11, 7, 0, 0).unwrap();
        assert_eq!(analyzer.night_of(end), date(10));

        // 23:30 UTC is already the next day at UTC+2
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let analyzer = SleepAnalyzer::new(offset, 8.0);
        let end = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(analyzer.night_of(end), date(10));
    }

    #[test]
    fn test_nightly_report_clips_to_window() {
        let analyzer = SleepAnalyzer::default();
        let samples = ideal_night(date(10));
        let window = TimeSpan::new(
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 11, 8, 0, 0).unwrap(),
        )
        .unwrap();

        let night = analyzer.nightly_report(&samples, &window);
        assert_eq!(night.night_date, date(10));
        assert!((night.total_hours - 7.0).abs() < 1e-9);
        assert!((night.deep_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_components() {
        let analyzer = SleepAnalyzer::default();
        // 4h: duration half credit, no deep or REM
        assert_eq!(analyzer.quality_score(4.0, 0.0, 0.0), 50);
        // 16h is as bad as no duration credit
        assert_eq!(analyzer.quality_score(16.0, 2.4, 3.5), 50);
        assert_eq!(analyzer.quality_score(0.0, 0.0, 0.0), 0);
        assert_eq!(analyzer.quality_score(8.0, 1.5, 1.8), 100);
    }

    #[test]
    fn test_invalid_target_falls_back() {
        let analyzer = SleepAnalyzer::new(FixedOffset::east_opt(0).unwrap(), -1.0);
        assert_eq!(analyzer.quality_score(8.0, 1.5, 1.8), 100);
    }
}
