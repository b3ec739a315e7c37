// Library interface for hyroxrs modules
// This allows integration tests and benches to access the core functionality

pub mod analytics;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod import;
pub mod ingestion;
pub mod intervals;
pub mod logging;
pub mod models;
pub mod readiness;
pub mod running;
pub mod sleep;
pub mod stations;
pub mod training_load;
pub mod zones;

// Re-export commonly used types for convenience
pub use models::*;
pub use analytics::{AnalyticsService, BatchSummary, CachedAnalytics, WeeklySummary, WorkoutSummary};
pub use cache::{AggregateCache, CacheMetrics};
pub use config::AppConfig;
pub use database::SqliteWorkoutStore;
pub use error::{HyroxError, Result};
pub use ingestion::{
    DuplicateTolerance, IdempotencyGuard, InMemoryWorkoutStore, IngestOutcome, IngestionService, WorkoutStore,
};
pub use intervals::IntervalMerger;
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use readiness::ReadinessCalculator;
pub use running::PaceAnalyzer;
pub use sleep::SleepAnalyzer;
pub use stations::{StationTracker, HYROX_STATION_ORDER};
pub use training_load::TrainingLoadAggregator;
pub use zones::{HeartRateZone, ZoneClassifier};
