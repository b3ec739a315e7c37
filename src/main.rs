use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hyroxrs::config::AppConfig;
use hyroxrs::export::{self, ExportFormat};
use hyroxrs::logging::{self, LogLevel};
use hyroxrs::{
    import, AnalyticsService, HyroxError, IdempotencyGuard, IngestionService, SqliteWorkoutStore,
};

/// hyroxrs - HYROX training analytics CLI
///
/// Derives sleep quality, readiness, training load, running pace and station
/// trends from exported health data, and ingests workouts idempotently.
#[derive(Parser)]
#[command(name = "hyroxrs")]
#[command(version)]
#[command(about = "HYROX training analytics CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weekly summary for one or more user snapshots
    Summary {
        /// Snapshot JSON (one snapshot or an array)
        #[arg(short, long)]
        file: PathBuf,

        /// Reference day (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: ExportFormat,

        /// Also write the report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Seven-night sleep report
    Sleep {
        /// Snapshot JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Reference day (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Also store the nightly metrics in this database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: ExportFormat,

        /// Also write the report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Station performance from a CSV segment log
    Stations {
        /// Segment CSV (station_name,segment_type,duration_seconds,timestamp)
        #[arg(short, long)]
        file: PathBuf,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: ExportFormat,

        /// Also write the report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest snapshot workouts into a local store, skipping duplicates
    Ingest {
        /// Snapshot JSON (one snapshot or an array)
        #[arg(short, long)]
        file: PathBuf,

        /// SQLite database path
        #[arg(long, default_value = "hyroxrs.db")]
        db: PathBuf,
    },

    /// Show or create the configuration file
    Config {
        /// Print the effective configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(cli.config.as_deref());

    let mut log_config = config.logging.clone();
    log_config.level = LogLevel::from_verbosity(config.logging.level, cli.verbose);
    let _log_guard = match logging::init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "Failed to initialize logging:".red(), e);
            None
        }
    };

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<HyroxError>() {
                Some(err) => {
                    logging::log_error(err);
                    eprintln!("{} {}", "Error:".red().bold(), err.user_message());
                }
                None => eprintln!("{} {:#}", "Error:".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let service = AnalyticsService::from_config(&config);
    let today = |date: Option<NaiveDate>| {
        date.unwrap_or_else(|| Utc::now().with_timezone(&config.athlete.offset()).date_naive())
    };

    match cli.command {
        Commands::Summary {
            file,
            date,
            format,
            output,
        } => {
            let snapshots = import::load_snapshots(&file)?;
            let batch = service.summarize_many(&snapshots, today(date));
            write_report(&batch.summaries, output.as_deref())?;

            match format {
                ExportFormat::Json => println!("{}", export::to_json(&batch.summaries)?),
                ExportFormat::Table => {
                    for summary in &batch.summaries {
                        println!("{}", export::render_weekly_summary(summary));
                    }
                }
            }

            for (user_id, error) in &batch.errors {
                eprintln!("{} {}: {}", "✗".red(), user_id, error);
            }
        }

        Commands::Sleep {
            file,
            date,
            db,
            format,
            output,
        } => {
            let snapshot = import::load_snapshot(&file)?;
            let nights = service
                .sleep_analyzer()
                .weekly_report(&snapshot.sleep_samples, today(date));
            write_report(&nights, output.as_deref())?;

            if let Some(db_path) = db {
                let store = open_store(&db_path)?;
                store.store_nightly_sleep(&snapshot.user_id, &nights)?;
                println!("{} {} nights stored in {}", "✓".green(), nights.len(), db_path.display());
            }

            match format {
                ExportFormat::Json => println!("{}", export::to_json(&nights)?),
                ExportFormat::Table => println!("{}", export::render_sleep_week(&nights)),
            }
        }

        Commands::Stations { file, format, output } => {
            let segments = import::load_segments_csv(&file)?;
            let samples: Vec<_> = segments.iter().filter_map(|s| s.station_sample()).collect();
            let stations = service.station_tracker().performance(&samples)?;
            write_report(&stations, output.as_deref())?;

            match format {
                ExportFormat::Json => println!("{}", export::to_json(&stations)?),
                ExportFormat::Table => println!("{}", export::render_stations(&stations)),
            }
        }

        Commands::Ingest { file, db } => {
            let snapshots = import::load_snapshots(&file)?;
            let service = IngestionService::new(
                open_store(&db)?,
                IdempotencyGuard::new(config.ingestion.tolerance()),
                config.ingestion.lock_bucket_seconds,
            );

            for snapshot in &snapshots {
                let summary = service.ingest_all(&snapshot.user_id, &snapshot.workouts)?;
                println!(
                    "{} {}: {} inserted, {} duplicates skipped",
                    "✓".green(),
                    snapshot.user_id,
                    summary.inserted,
                    summary.duplicates
                );
            }

            let stats = service.store().get_stats()?;
            println!(
                "{}",
                format!(
                    "Store holds {} workouts for {} users",
                    stats.workout_count, stats.user_count
                )
                .dimmed()
            );
        }

        Commands::Config { show, init } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_config_path);

            if init {
                if path.exists() {
                    println!("{} {}", "Configuration already exists:".yellow(), path.display());
                } else {
                    AppConfig::default().save_to_file(&path)?;
                    println!("{} {}", "✓ Wrote default configuration to".green(), path.display());
                }
            }

            if show || !init {
                println!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);
            }
        }
    }

    Ok(())
}

fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        export::export_json(report, path)?;
        eprintln!("{} {}", "✓ Report written to".green(), path.display());
    }
    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteWorkoutStore> {
    SqliteWorkoutStore::open(path).with_context(|| format!("Failed to open store at {}", path.display()))
}
