//! Running pace and split analysis
//!
//! Derives per-kilometer splits from a workout's laps (or synthesizes even
//! splits from distance and duration), then computes pace statistics and
//! pace-zone shares over them.

use statrs::statistics::Statistics;
use tracing::debug;

use crate::models::{HeartRateSample, PaceMetrics, Split, WorkoutRecord};

/// Fastest plausible pace in seconds per km
pub const MIN_PLAUSIBLE_PACE: f64 = 120.0;

/// Slowest plausible pace in seconds per km
pub const MAX_PLAUSIBLE_PACE: f64 = 900.0;

/// Pace zone lower bounds in s/km, slowest first:
/// - Z1: > 6:00/km (Easy)
/// - Z2: 5:30-6:00/km (Aerobic)
/// - Z3: 5:00-5:30/km (Tempo)
/// - Z4: 4:30-5:00/km (Threshold)
/// - Z5: <= 4:30/km (VO2 Max)
const PACE_ZONE_BOUNDS: [f64; 4] = [360.0, 330.0, 300.0, 270.0];

/// Pace and split analyzer with a configurable plausibility window
#[derive(Debug, Clone)]
pub struct PaceAnalyzer {
    min_plausible_pace: f64,
    max_plausible_pace: f64,
}

impl Default for PaceAnalyzer {
    fn default() -> Self {
        PaceAnalyzer {
            min_plausible_pace: MIN_PLAUSIBLE_PACE,
            max_plausible_pace: MAX_PLAUSIBLE_PACE,
        }
    }
}

impl PaceAnalyzer {
    pub fn new(min_plausible_pace: f64, max_plausible_pace: f64) -> Self {
        PaceAnalyzer {
            min_plausible_pace,
            max_plausible_pace,
        }
    }

    /// Kilometer splits for a workout.
    ///
    /// Each lap is taken as one kilometer; laps whose pace falls outside the
    /// plausible window are dropped. Without usable laps, `floor(distance_km)`
    /// even splits at the workout's average pace are returned, provided that
    /// average pace is itself plausible.
    pub fn derive_splits(&self, workout: &WorkoutRecord) -> Vec<Split> {
        self.derive_splits_with_heart_rate(workout, &[])
    }

    /// Like [`derive_splits`](Self::derive_splits), filling each lap split's
    /// heart rate from the samples overlapping that lap
    pub fn derive_splits_with_heart_rate(
        &self,
        workout: &WorkoutRecord,
        heart_rate: &[HeartRateSample],
    ) -> Vec<Split> {
        let lap_splits = self.splits_from_laps(workout, heart_rate);
        if !lap_splits.is_empty() {
            return lap_splits;
        }

        self.even_splits(workout)
    }

    fn splits_from_laps(&self, workout: &WorkoutRecord, heart_rate: &[HeartRateSample]) -> Vec<Split> {
        let mut splits = Vec::with_capacity(workout.laps.len());

        for lap in &workout.laps {
            // One lap is one kilometer
            let pace = lap.duration_seconds();
            if !self.is_plausible(pace) {
                debug!(workout = %workout.id, pace, "Discarding implausible lap");
                continue;
            }

            let lap_hr: Vec<f64> = heart_rate
                .iter()
                .filter(|sample| sample.span.overlaps(lap))
                .map(|sample| sample.bpm)
                .collect();
            let avg_hr = if lap_hr.is_empty() {
                None
            } else {
                Some(lap_hr.iter().mean().round() as u32)
            };

            splits.push(Split {
                km_index: splits.len() as u32 + 1,
                duration_seconds: pace,
                pace_per_km: pace,
                heart_rate: avg_hr,
                elevation_gain: None,
            });
        }

        splits
    }

    fn even_splits(&self, workout: &WorkoutRecord) -> Vec<Split> {
        let distance_km = workout.distance_km();
        let duration = workout.duration_seconds();
        if distance_km <= 0.0 || duration <= 0.0 || !distance_km.is_finite() {
            return Vec::new();
        }

        // Bounds the split count by duration / min_plausible_pace
        let avg_pace = duration / distance_km;
        if !self.is_plausible(avg_pace) {
            debug!(workout = %workout.id, avg_pace, "No even splits for implausible average pace");
            return Vec::new();
        }
        let count = distance_km.floor() as u32;

        (1..=count)
            .map(|km_index| Split {
                km_index,
                duration_seconds: avg_pace,
                pace_per_km: avg_pace,
                heart_rate: None,
                elevation_gain: None,
            })
            .collect()
    }

    pub fn is_plausible(&self, pace: f64) -> bool {
        pace >= self.min_plausible_pace && pace <= self.max_plausible_pace
    }

    /// Pace statistics over splits.
    ///
    /// Consistency is the coefficient of variation (population standard
    /// deviation over mean) in percent, using `avg_pace` as the mean when it is
    /// positive. Fade compares the average pace of the second half of the
    /// splits to the first half, split at `count / 2`.
    pub fn pace_metrics(splits: &[Split], avg_pace: f64) -> PaceMetrics {
        if splits.is_empty() {
            return PaceMetrics::default();
        }

        let paces: Vec<f64> = splits.iter().map(|s| s.pace_per_km).collect();

        let fastest = paces.iter().copied().fold(f64::INFINITY, f64::min);
        let slowest = paces.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mean = if avg_pace.is_finite() && avg_pace > 0.0 {
            avg_pace
        } else {
            paces.iter().mean()
        };
        let consistency = if mean > 0.0 {
            Some(paces.iter().population_std_dev() / mean * 100.0)
        } else {
            None
        };

        let half = paces.len() / 2;
        let fade = if half == 0 {
            None
        } else {
            let first = paces[..half].iter().mean();
            let second = paces[half..].iter().mean();
            if first > 0.0 {
                Some((second - first) / first * 100.0)
            } else {
                None
            }
        };

        PaceMetrics {
            fastest: Some(fastest),
            slowest: Some(slowest),
            consistency_percent: consistency,
            fade_factor_percent: fade,
        }
    }

    /// Pace zone (1-5) for a pace in s/km; faster paces are higher zones
    pub fn pace_zone(pace: f64) -> u8 {
        if pace > PACE_ZONE_BOUNDS[0] {
            1
        } else if pace > PACE_ZONE_BOUNDS[1] {
            2
        } else if pace > PACE_ZONE_BOUNDS[2] {
            3
        } else if pace > PACE_ZONE_BOUNDS[3] {
            4
        } else {
            5
        }
    }

    /// Share of paces per zone as integer percentages, zeros when empty.
    ///
    /// Largest-remainder allocation: every zone gets the floor of its share,
    /// the points left over go to the zones with the largest fractional
    /// parts (lower zone first on ties), so a non-empty result sums to 100.
    pub fn pace_zone_percentages(paces: &[f64]) -> [u32; 5] {
        let mut counts = [0u64; 5];
        for &pace in paces {
            counts[(Self::pace_zone(pace) - 1) as usize] += 1;
        }

        let total = paces.len() as u64;
        if total == 0 {
            return [0; 5];
        }

        let mut percentages = counts.map(|count| (count * 100 / total) as u32);
        let remainders = counts.map(|count| count * 100 % total);

        let mut by_remainder: Vec<usize> = (0..5).collect();
        by_remainder.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));

        let leftover = 100 - percentages.iter().sum::<u32>();
        for &zone in by_remainder.iter().take(leftover as usize) {
            percentages[zone] += 1;
        }

        percentages
    }
}
