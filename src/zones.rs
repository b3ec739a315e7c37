use crate::error::{CalculationError, Result};
use crate::models::{HeartRateSample, HeartRateZoneDurations};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-zone heart-rate model based on percent of maximum heart rate
///
/// Upper bounds are exclusive and evaluated in order:
/// - Z1: < 60% MaxHR (Recovery)
/// - Z2: < 70% MaxHR (Aerobic Base)
/// - Z3: < 80% MaxHR (Tempo)
/// - Z4: < 90% MaxHR (Threshold)
/// - Z5: otherwise (VO2 Max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeartRateZone {
    Zone1,
    Zone2,
    Zone3,
    Zone4,
    Zone5,
}

impl HeartRateZone {
    pub fn from_percent_max(percent_max: f64) -> Self {
        if percent_max < 0.60 {
            HeartRateZone::Zone1
        } else if percent_max < 0.70 {
            HeartRateZone::Zone2
        } else if percent_max < 0.80 {
            HeartRateZone::Zone3
        } else if percent_max < 0.90 {
            HeartRateZone::Zone4
        } else {
            HeartRateZone::Zone5
        }
    }

    /// Zone number (1-5)
    pub fn number(&self) -> u8 {
        match self {
            HeartRateZone::Zone1 => 1,
            HeartRateZone::Zone2 => 2,
            HeartRateZone::Zone3 => 3,
            HeartRateZone::Zone4 => 4,
            HeartRateZone::Zone5 => 5,
        }
    }
}

impl fmt::Display for HeartRateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}", self.number())
    }
}

/// Heart-rate zone classification utilities
pub struct ZoneClassifier;

impl ZoneClassifier {
    /// Attribute each sample's window duration to its heart-rate zone
    pub fn classify(samples: &[HeartRateSample], max_hr: f64) -> Result<HeartRateZoneDurations> {
        Self::validate_max_hr(max_hr)?;
        Ok(Self::accumulate(samples, max_hr, |sample| {
            sample.span.duration_seconds()
        }))
    }

    /// Classify instantaneous samples that each stand for `seconds_per_sample`
    pub fn classify_instantaneous(
        samples: &[HeartRateSample],
        max_hr: f64,
        seconds_per_sample: f64,
    ) -> Result<HeartRateZoneDurations> {
        Self::validate_max_hr(max_hr)?;
        if !seconds_per_sample.is_finite() || seconds_per_sample < 0.0 {
            return Err(CalculationError::invalid(
                "heart rate zones",
                "seconds_per_sample",
                seconds_per_sample,
            )
            .into());
        }
        Ok(Self::accumulate(samples, max_hr, |_| seconds_per_sample))
    }

    /// Zone for a single heart-rate value
    pub fn zone_for(bpm: f64, max_hr: f64) -> Result<HeartRateZone> {
        Self::validate_max_hr(max_hr)?;
        Ok(HeartRateZone::from_percent_max(bpm / max_hr))
    }

    /// Average and maximum bpm, both zero for an empty set
    pub fn average_and_max(samples: &[HeartRateSample]) -> (f64, f64) {
        if samples.is_empty() {
            return (0.0, 0.0);
        }

        let sum: f64 = samples.iter().map(|s| s.bpm).sum();
        let max = samples.iter().map(|s| s.bpm).fold(f64::MIN, f64::max);

        (sum / samples.len() as f64, max)
    }

    fn accumulate<F>(samples: &[HeartRateSample], max_hr: f64, duration_of: F) -> HeartRateZoneDurations
    where
        F: Fn(&HeartRateSample) -> f64,
    {
        let mut zones = HeartRateZoneDurations::default();

        for sample in samples {
            let seconds = duration_of(sample);
            match HeartRateZone::from_percent_max(sample.bpm / max_hr) {
                HeartRateZone::Zone1 => zones.zone1 += seconds,
                HeartRateZone::Zone2 => zones.zone2 += seconds,
                HeartRateZone::Zone3 => zones.zone3 += seconds,
                HeartRateZone::Zone4 => zones.zone4 += seconds,
                HeartRateZone::Zone5 => zones.zone5 += seconds,
            }
        }

        zones
    }

    fn validate_max_hr(max_hr: f64) -> Result<()> {
        if !max_hr.is_finite() || max_hr <= 0.0 {
            return Err(CalculationError::invalid("heart rate zones", "max_hr", max_hr).into());
        }
        Ok(())
    }
}
