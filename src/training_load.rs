use chrono::{Days, FixedOffset, NaiveDate, Offset, Utc};
use std::collections::BTreeMap;

use crate::error::{CalculationError, Result};
use crate::models::{DailyLoad, WeeklyTrainingLoad, WorkoutRecord};

const SECONDS_PER_HOUR: f64 = 3600.0;
const WEEK_DAYS: u64 = 7;

/// Training-hour aggregation by calendar day
#[derive(Debug, Clone)]
pub struct TrainingLoadAggregator {
    offset: FixedOffset,
}

impl Default for TrainingLoadAggregator {
    fn default() -> Self {
        TrainingLoadAggregator { offset: Utc.fix() }
    }
}

impl TrainingLoadAggregator {
    pub fn new(offset: FixedOffset) -> Self {
        TrainingLoadAggregator { offset }
    }

    /// Calendar day a workout counts towards (its start, local time)
    pub fn workout_day(&self, workout: &WorkoutRecord) -> NaiveDate {
        workout.span.start.with_timezone(&self.offset).date_naive()
    }

    /// Sum training hours per day
    pub fn aggregate_daily_hours(&self, workouts: &[WorkoutRecord]) -> BTreeMap<NaiveDate, f64> {
        let mut daily_hours: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        for workout in workouts {
            let hours = workout.duration_seconds() / SECONDS_PER_HOUR;
            *daily_hours.entry(self.workout_day(workout)).or_insert(0.0) += hours;
        }

        daily_hours
    }

    /// Training volume for the seven days ending `today`.
    ///
    /// `daily_breakdown[i]` covers `today - i`, so index 0 is today.
    pub fn weekly_load(
        &self,
        workouts: &[WorkoutRecord],
        target_hours: f64,
        today: NaiveDate,
    ) -> Result<WeeklyTrainingLoad> {
        if !target_hours.is_finite() || target_hours < 0.0 {
            return Err(CalculationError::invalid("weekly load", "target_hours", target_hours).into());
        }

        let daily_hours = self.aggregate_daily_hours(workouts);

        let daily_breakdown: Vec<DailyLoad> = (0..WEEK_DAYS)
            .filter_map(|back| today.checked_sub_days(Days::new(back)))
            .map(|date| DailyLoad {
                day_label: date.format("%a").to_string(),
                date,
                hours: daily_hours.get(&date).copied().unwrap_or(0.0),
                is_today: date == today,
            })
            .collect();

        let current_hours = daily_breakdown.iter().map(|day| day.hours).sum();

        Ok(WeeklyTrainingLoad {
            target_hours,
            current_hours,
            daily_breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, TimeSpan};
    use chrono::{Duration, TimeZone};

    fn workout(id: &str, day: u32, hour: u32, minutes: i64) -> WorkoutRecord {
        let start = Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap();
        WorkoutRecord {
            id: id.to_string(),
            span: TimeSpan::new(start, start + Duration::minutes(minutes)).unwrap(),
            distance_meters: 0.0,
            activity_kind: ActivityKind::Hyrox,
            laps: Vec::new(),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_weekly_load_breakdown() {
        let workouts = vec![
            workout("a", 14, 7, 60),
            workout("b", 14, 18, 30),
            workout("c", 12, 9, 90),
            // Outside the trailing week
            workout("d", 7, 9, 120),
        ];

        let load = TrainingLoadAggregator::default()
            .weekly_load(&workouts, 6.0, date(14))
            .unwrap();

        assert_eq!(load.daily_breakdown.len(), 7);
        assert!(load.daily_breakdown[0].is_today);
        assert_eq!(load.daily_breakdown[0].date, date(14));
        assert_eq!(load.daily_breakdown[0].day_label, "Fri");
        assert!((load.daily_breakdown[0].hours - 1.5).abs() < 1e-9);
        assert!((load.daily_breakdown[2].hours - 1.5).abs() < 1e-9);
        assert_eq!(load.daily_breakdown[6].date, date(8));
        assert!(load.daily_breakdown[1..].iter().all(|d| !d.is_today));
        assert!((load.current_hours - 3.0).abs() < 1e-9);
        assert_eq!(load.target_hours, 6.0);
    }

    #[test]
    fn test_empty_week() {
        let load = TrainingLoadAggregator::default()
            .weekly_load(&[], 5.0, date(14))
            .unwrap();
        assert_eq!(load.current_hours, 0.0);
        assert!(load.daily_breakdown.iter().all(|d| d.hours == 0.0));
    }

    #[test]
    fn test_local_day_assignment() {
        // 23:00 UTC on the 13th is the 14th at UTC+2
        let aggregator = TrainingLoadAggregator::new(FixedOffset::east_opt(2 * 3600).unwrap());
        let load = aggregator
            .weekly_load(&[workout("late", 13, 23, 60)], 5.0, date(14))
            .unwrap();
        assert!((load.daily_breakdown[0].hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_target_rejected() {
        let result = TrainingLoadAggregator::default().weekly_load(&[], -1.0, date(14));
        assert!(result.is_err());
    }
}
