//! Report rendering: JSON for machines, tables for the terminal

use colored::*;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::analytics::WeeklySummary;
use crate::error::{HyroxError, Result};
use crate::models::{NightlySleepMetrics, StationPerformance, Trend, WeeklyTrainingLoad};

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Table,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(ExportFormat::Table),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!("Invalid export format: {}", s)),
        }
    }
}

/// Serialize any report to pretty JSON
pub fn to_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| HyroxError::Internal(format!("JSON serialization failed: {}", e)))
}

/// Export any serializable data structure to a JSON file
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    std::fs::write(output_path, to_json(data)?)?;
    Ok(())
}

/// Seconds per km as `m:ss/km`
pub fn format_pace(seconds_per_km: f64) -> String {
    let total = seconds_per_km.round() as i64;
    format!("{}:{:02}/km", total / 60, total % 60)
}

/// Seconds as `h:mm:ss`, or `m:ss` under an hour
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as i64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:+.1}%", v))
}

#[derive(Tabled)]
struct SleepRow {
    #[tabled(rename = "Night")]
    night: String,
    #[tabled(rename = "Total (h)")]
    total: String,
    #[tabled(rename = "Deep (h)")]
    deep: String,
    #[tabled(rename = "REM (h)")]
    rem: String,
    #[tabled(rename = "Quality")]
    quality: u8,
}

#[derive(Tabled)]
struct LoadRow {
    #[tabled(rename = "Day")]
    day: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Hours")]
    hours: String,
}

#[derive(Tabled)]
struct WorkoutRow {
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Km")]
    distance: String,
    #[tabled(rename = "Time")]
    duration: String,
    #[tabled(rename = "Pace")]
    pace: String,
    #[tabled(rename = "Avg HR")]
    average_hr: String,
    #[tabled(rename = "Fade")]
    fade: String,
}

#[derive(Tabled)]
struct StationRow {
    #[tabled(rename = "Station")]
    station: String,
    #[tabled(rename = "Best")]
    best: String,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Last")]
    last: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Score")]
    score: u8,
}

fn table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Seven-night sleep table
pub fn render_sleep_week(nights: &[NightlySleepMetrics]) -> String {
    let rows = nights
        .iter()
        .map(|n| SleepRow {
            night: n.night_date.format("%a %d %b").to_string(),
            total: format!("{:.1}", n.total_hours),
            deep: format!("{:.1}", n.deep_hours),
            rem: format!("{:.1}", n.rem_hours),
            quality: n.quality,
        })
        .collect();
    table::<SleepRow>(rows)
}

/// Station performance table in tracker order
pub fn render_stations(stations: &[StationPerformance]) -> String {
    if stations.is_empty() {
        return "No station efforts recorded".dimmed().to_string();
    }

    let rows = stations
        .iter()
        .map(|s| StationRow {
            station: s.station_name.clone(),
            best: format_duration(s.best_time),
            average: format_duration(s.average_time),
            last: format_duration(s.last_time),
            trend: match s.trend {
                Trend::Improving => "↑ Improving".to_string(),
                Trend::Declining => "↓ Declining".to_string(),
                Trend::Stable => "→ Stable".to_string(),
            },
            score: s.score,
        })
        .collect();
    table::<StationRow>(rows)
}

fn render_training_load(load: &WeeklyTrainingLoad) -> String {
    let rows = load
        .daily_breakdown
        .iter()
        .rev()
        .map(|d| LoadRow {
            day: if d.is_today {
                format!("{} (today)", d.day_label)
            } else {
                d.day_label.clone()
            },
            date: d.date.to_string(),
            hours: format!("{:.1}", d.hours),
        })
        .collect();
    table::<LoadRow>(rows)
}

/// Full weekly summary as terminal text
pub fn render_weekly_summary(summary: &WeeklySummary) -> String {
    WeeklyReport(summary).to_string()
}

struct WeeklyReport<'a>(&'a WeeklySummary);

impl fmt::Display for WeeklyReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.0;

        writeln!(
            f,
            "{}",
            format!("Weekly summary for {} ({})", summary.user_id, summary.reference_date)
                .bold()
                .cyan()
        )?;
        writeln!(f)?;

        let readiness = summary.readiness.total;
        let readiness_text = match readiness {
            75..=100 => readiness.to_string().green(),
            50..=74 => readiness.to_string().yellow(),
            _ => readiness.to_string().red(),
        };
        writeln!(
            f,
            "{} {}  (HRV +{}, sleep +{}, heart rate +{})",
            "Readiness:".bold(),
            readiness_text,
            summary.readiness.hrv_score,
            summary.readiness.sleep_contribution,
            summary.readiness.resting_hr_contribution
        )?;
        writeln!(f)?;

        writeln!(f, "{}", "Sleep".bold())?;
        writeln!(f, "{}", render_sleep_week(&summary.sleep))?;
        writeln!(f)?;

        let load = &summary.training_load;
        writeln!(
            f,
            "{} {:.1} / {:.1} h",
            "Training load:".bold(),
            load.current_hours,
            load.target_hours
        )?;
        writeln!(f, "{}", render_training_load(load))?;
        writeln!(f)?;

        writeln!(f, "{}", "Workouts".bold())?;
        if summary.workouts.is_empty() {
            writeln!(f, "{}", "No workouts this week".dimmed())?;
        } else {
            let rows = summary
                .workouts
                .iter()
                .map(|w| WorkoutRow {
                    start: w.start.format("%a %H:%M").to_string(),
                    kind: w.activity_kind.to_string(),
                    distance: format!("{:.2}", w.distance_km),
                    duration: format_duration(w.duration_seconds),
                    pace: w.average_pace.map_or_else(|| "-".to_string(), format_pace),
                    average_hr: if w.average_hr > 0.0 {
                        format!("{:.0}", w.average_hr)
                    } else {
                        "-".to_string()
                    },
                    fade: format_percent(w.pace.fade_factor_percent),
                })
                .collect();
            writeln!(f, "{}", table::<WorkoutRow>(rows))?;
        }
        writeln!(f)?;

        writeln!(f, "{}", "Stations".bold())?;
        writeln!(f, "{}", render_stations(&summary.stations))?;
        writeln!(f)?;

        let effort = &summary.effort;
        writeln!(
            f,
            "{} run {:.0}%, transitions {:.0}%, stations {:.0}%",
            "Time of effort:".bold(),
            effort.run_percent,
            effort.transition_percent,
            effort.station_percent
        )
    }
}
