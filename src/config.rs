use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::ingestion::{
    DuplicateTolerance, DEFAULT_DISTANCE_TOLERANCE_METERS, DEFAULT_DURATION_TOLERANCE_SECONDS,
    DEFAULT_LOCK_BUCKET_SECONDS, DEFAULT_START_TOLERANCE_SECONDS, MAX_START_TOLERANCE_SECONDS,
};
use crate::logging::LogConfig;
use crate::running::{MAX_PLAUSIBLE_PACE, MIN_PLAUSIBLE_PACE};
use crate::sleep::DEFAULT_TARGET_HOURS;
use crate::stations::HYROX_STATION_ORDER;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Athlete physiology and weekly goals
    pub athlete: AthleteSettings,

    pub sleep: SleepSettings,

    /// Running split plausibility window
    pub pace: PaceSettings,

    /// Duplicate detection and write serialization
    pub ingestion: IngestionSettings,

    pub stations: StationSettings,

    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AthleteSettings {
    /// Maximum heart rate used when a snapshot carries none
    pub max_hr: f64,

    /// Weekly training-hour target
    pub weekly_target_hours: f64,

    /// Offset from UTC used to assign samples to calendar days
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepSettings {
    pub target_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceSettings {
    /// Fastest accepted split pace (s/km)
    pub min_plausible_pace: f64,

    /// Slowest accepted split pace (s/km)
    pub max_plausible_pace: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub start_tolerance_seconds: f64,
    pub duration_tolerance_seconds: f64,
    pub distance_tolerance_meters: f64,

    /// Width of the per-user lock buckets
    pub lock_bucket_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Display order for station reports; empty sorts alphabetically
    pub order: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            metadata: ConfigMetadata::default(),
            athlete: AthleteSettings::default(),
            sleep: SleepSettings::default(),
            pace: PaceSettings::default(),
            ingestion: IngestionSettings::default(),
            stations: StationSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        ConfigMetadata {
            version: "1.0".to_string(),
            updated_at: Utc::now(),
        }
    }
}

impl Default for AthleteSettings {
    fn default() -> Self {
        AthleteSettings {
            max_hr: 190.0,
            weekly_target_hours: 6.0,
            utc_offset_minutes: 0,
        }
    }
}

impl Default for SleepSettings {
    fn default() -> Self {
        SleepSettings {
            target_hours: DEFAULT_TARGET_HOURS,
        }
    }
}

impl Default for PaceSettings {
    fn default() -> Self {
        PaceSettings {
            min_plausible_pace: MIN_PLAUSIBLE_PACE,
            max_plausible_pace: MAX_PLAUSIBLE_PACE,
        }
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        IngestionSettings {
            start_tolerance_seconds: DEFAULT_START_TOLERANCE_SECONDS,
            duration_tolerance_seconds: DEFAULT_DURATION_TOLERANCE_SECONDS,
            distance_tolerance_meters: DEFAULT_DISTANCE_TOLERANCE_METERS,
            lock_bucket_seconds: DEFAULT_LOCK_BUCKET_SECONDS,
        }
    }
}

impl Default for StationSettings {
    fn default() -> Self {
        StationSettings {
            order: HYROX_STATION_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AthleteSettings {
    /// Configured offset, UTC when out of range
    pub fn offset(&self) -> FixedOffset {
        self.checked_offset().unwrap_or_else(|| Utc.fix())
    }

    fn checked_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}

impl IngestionSettings {
    pub fn tolerance(&self) -> DuplicateTolerance {
        DuplicateTolerance {
            start_seconds: self.start_tolerance_seconds,
            duration_seconds: self.duration_tolerance_seconds,
            distance_meters: self.distance_tolerance_meters,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Default configuration file location
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hyroxrs")
            .join("config.toml")
    }

    /// Configuration from `path` (or the default location), falling back to
    /// defaults when the file is missing or unusable
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %config_path.display(), error = %format!("{:#}", e), "Using default configuration");
                Self::default()
            }
        }
    }

    /// Reject settings no analysis could run with
    pub fn validate(&self) -> Result<()> {
        if !(self.athlete.max_hr.is_finite() && self.athlete.max_hr > 0.0) {
            bail!("athlete.max_hr must be positive, got {}", self.athlete.max_hr);
        }
        if !(self.athlete.weekly_target_hours.is_finite() && self.athlete.weekly_target_hours >= 0.0) {
            bail!(
                "athlete.weekly_target_hours must not be negative, got {}",
                self.athlete.weekly_target_hours
            );
        }
        if self.athlete.checked_offset().is_none() {
            bail!(
                "athlete.utc_offset_minutes out of range: {}",
                self.athlete.utc_offset_minutes
            );
        }
        if !(self.sleep.target_hours.is_finite() && self.sleep.target_hours > 0.0) {
            bail!("sleep.target_hours must be positive, got {}", self.sleep.target_hours);
        }
        if !(self.pace.min_plausible_pace > 0.0 && self.pace.min_plausible_pace < self.pace.max_plausible_pace) {
            bail!(
                "pace window [{}, {}] is empty",
                self.pace.min_plausible_pace,
                self.pace.max_plausible_pace
            );
        }

        let tolerance = self.ingestion.tolerance();
        for (name, value) in [
            ("start_tolerance_seconds", tolerance.start_seconds),
            ("duration_tolerance_seconds", tolerance.duration_seconds),
            ("distance_tolerance_meters", tolerance.distance_meters),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("ingestion.{} must not be negative, got {}", name, value);
            }
        }
        if tolerance.start_seconds > MAX_START_TOLERANCE_SECONDS {
            bail!(
                "ingestion.start_tolerance_seconds must be at most {}, got {}",
                MAX_START_TOLERANCE_SECONDS,
                tolerance.start_seconds
            );
        }
        if self.ingestion.lock_bucket_seconds <= 0 {
            bail!(
                "ingestion.lock_bucket_seconds must be positive, got {}",
                self.ingestion.lock_bucket_seconds
            );
        }

        Ok(())
    }
}
