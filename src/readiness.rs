//! Daily readiness scoring
//!
//! Readiness starts from a neutral base of 50 and adds bounded contributions
//! from the physiological signals that are available:
//!
//! - **HRV**: up to 25 points, `hrv / 100 * 25`
//! - **Sleep quality**: up to 25 points, `quality / 4`
//! - **Resting HR**: up to 10 points, `max(0, 100 - (rhr - 40)) / 10`.
//!   When no resting HR was measured, the day's average heart rate is scored
//!   with the same formula instead.
//!
//! Each contribution is truncated to whole points and the total is clamped to
//! 0-100. Missing signals contribute nothing.

use crate::error::{CalculationError, Result};
use crate::models::ReadinessScore;

const BASE_SCORE: i32 = 50;
const MAX_HRV_POINTS: f64 = 25.0;
const MAX_HEART_RATE_POINTS: f64 = 10.0;

pub struct ReadinessCalculator;

impl ReadinessCalculator {
    /// Compose a readiness score from optional recovery signals.
    ///
    /// `fallback_avg_hr` stands in for a missing resting heart rate; a value
    /// of 0 means no heart-rate signal at all.
    pub fn readiness(
        hrv: Option<f64>,
        sleep_quality: Option<u8>,
        resting_hr: Option<u32>,
        fallback_avg_hr: u32,
    ) -> Result<ReadinessScore> {
        let hrv_score = match hrv {
            Some(value) if !value.is_finite() || value < 0.0 => {
                return Err(CalculationError::invalid("readiness", "hrv", value).into());
            }
            Some(value) => (value / 100.0 * MAX_HRV_POINTS).min(MAX_HRV_POINTS) as i32,
            None => 0,
        };

        let sleep_contribution = match sleep_quality {
            Some(quality) if quality > 100 => {
                return Err(CalculationError::invalid("readiness", "sleep_quality", quality).into());
            }
            Some(quality) => i32::from(quality) / 4,
            None => 0,
        };

        let resting_hr_contribution = match resting_hr {
            Some(rhr) => Self::heart_rate_points(rhr),
            None if fallback_avg_hr > 0 => Self::heart_rate_points(fallback_avg_hr),
            None => 0,
        };

        let total = (BASE_SCORE + hrv_score + sleep_contribution + resting_hr_contribution).clamp(0, 100);

        Ok(ReadinessScore {
            hrv_score,
            sleep_contribution,
            resting_hr_contribution,
            total: total as u8,
        })
    }

    fn heart_rate_points(bpm: u32) -> i32 {
        let headroom = (100.0 - (f64::from(bpm) - 40.0)).max(0.0);
        (headroom / 10.0).min(MAX_HEART_RATE_POINTS) as i32
    }
}
