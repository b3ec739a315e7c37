//! Snapshot and segment-log loaders
//!
//! JSON snapshots mirror [`UserSnapshot`]; a file may hold one snapshot or an
//! array of them. Segment logs are CSV with the header
//! `station_name,segment_type,duration_seconds,timestamp` and RFC 3339
//! timestamps.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ImportError, Result};
use crate::models::{SegmentLog, SegmentType, TimeSpan, UserSnapshot};

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Many(Vec<UserSnapshot>),
    One(Box<UserSnapshot>),
}

/// Load a single user snapshot
pub fn load_snapshot(path: &Path) -> Result<UserSnapshot> {
    let mut snapshots = load_snapshots(path)?;
    match snapshots.len() {
        1 => Ok(snapshots.remove(0)),
        n => Err(ImportError::ParseError {
            format: "json".to_string(),
            reason: format!("expected one snapshot in {}, found {}", path.display(), n),
        }
        .into()),
    }
}

/// Load every snapshot in a file holding one snapshot or an array
pub fn load_snapshots(path: &Path) -> Result<Vec<UserSnapshot>> {
    let content = read_file(path)?;
    let snapshots = parse_snapshots(&content)?;
    info!(path = %path.display(), snapshots = snapshots.len(), "Loaded snapshots");
    Ok(snapshots)
}

/// Parse and validate snapshot JSON
pub fn parse_snapshots(json: &str) -> Result<Vec<UserSnapshot>> {
    let parsed: SnapshotFile = serde_json::from_str(json).map_err(|e| ImportError::ParseError {
        format: "json".to_string(),
        reason: e.to_string(),
    })?;

    let mut snapshots = match parsed {
        SnapshotFile::Many(snapshots) => snapshots,
        SnapshotFile::One(snapshot) => vec![*snapshot],
    };

    for snapshot in &mut snapshots {
        validate_snapshot(snapshot)?;
    }
    Ok(snapshots)
}

/// Enforce data-model invariants serde cannot check and fill missing ids
pub fn validate_snapshot(snapshot: &mut UserSnapshot) -> Result<()> {
    let user = snapshot.user_id.clone();

    for (i, sample) in snapshot.sleep_samples.iter().enumerate() {
        check_span(&sample.span, || format!("{} sleep sample {}", user, i))?;
    }

    for (i, sample) in snapshot.heart_rate_samples.iter().enumerate() {
        check_span(&sample.span, || format!("{} heart rate sample {}", user, i))?;
        if !sample.bpm.is_finite() || sample.bpm < 0.0 {
            return Err(invalid(format!("{} heart rate sample {}", user, i), "bpm must not be negative"));
        }
    }

    for workout in &mut snapshot.workouts {
        if workout.id.trim().is_empty() {
            workout.id = Uuid::new_v4().to_string();
            debug!(user = %user, id = %workout.id, "Assigned id to workout");
        }
        let record = format!("{} workout {}", user, workout.id);
        check_span(&workout.span, || record.clone())?;
        for lap in &workout.laps {
            check_span(lap, || format!("{} lap", record))?;
        }
        if !workout.distance_meters.is_finite() || workout.distance_meters < 0.0 {
            return Err(invalid(record, "distance must not be negative"));
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct SegmentRow {
    station_name: String,
    segment_type: String,
    duration_seconds: f64,
    timestamp: String,
}

/// Load a CSV segment log
pub fn load_segments_csv(path: &Path) -> Result<Vec<SegmentLog>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let file = fs::File::open(path)?;
    let segments = parse_segments_csv(file)?;
    info!(path = %path.display(), segments = segments.len(), "Loaded segment log");
    Ok(segments)
}

/// Parse a CSV segment log from any reader
pub fn parse_segments_csv<R: Read>(reader: R) -> Result<Vec<SegmentLog>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut segments = Vec::new();
    for (i, row) in reader.deserialize::<SegmentRow>().enumerate() {
        let line = i + 2;
        let row = row.map_err(|e| ImportError::ParseError {
            format: "csv".to_string(),
            reason: format!("line {}: {}", line, e),
        })?;
        segments.push(segment_from_row(row, line)?);
    }

    Ok(segments)
}

fn segment_from_row(row: SegmentRow, line: usize) -> Result<SegmentLog> {
    let record = format!("segment on line {}", line);

    let segment_type = match row.segment_type.to_lowercase().as_str() {
        "run" => SegmentType::Run,
        "transition" => SegmentType::Transition,
        "station" => SegmentType::Station,
        other => return Err(invalid(record, format!("unknown segment type '{}'", other))),
    };

    if !row.duration_seconds.is_finite() || row.duration_seconds < 0.0 {
        return Err(invalid(record, "duration must not be negative"));
    }

    let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
        .map_err(|e| invalid(record.clone(), format!("bad timestamp '{}': {}", row.timestamp, e)))?
        .with_timezone(&Utc);

    Ok(SegmentLog {
        station_name: row.station_name,
        segment_type,
        duration_seconds: row.duration_seconds,
        timestamp,
    })
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ImportError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(fs::read_to_string(path)?)
}

fn check_span<F: FnOnce() -> String>(span: &TimeSpan, record: F) -> Result<()> {
    if span.is_valid() {
        Ok(())
    } else {
        Err(invalid(record(), "end is before start"))
    }
}

fn invalid(record: String, reason: impl ToString) -> crate::error::HyroxError {
    ImportError::InvalidRecord {
        record,
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HyroxError;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "user_id": "athlete-1",
        "hrv_ms": 55.0,
        "workouts": [{
            "id": "",
            "span": {"start": "2024-06-14T07:00:00Z", "end": "2024-06-14T07:30:00Z"},
            "distance_meters": 5000.0,
            "activity_kind": "Running"
        }],
        "heart_rate_samples": [{
            "bpm": 140.0,
            "span": {"start": "2024-06-14T07:00:00Z", "end": "2024-06-14T07:00:05Z"}
        }]
    }"#;

    #[test]
    fn test_single_snapshot_with_generated_id() {
        let snapshots = parse_snapshots(SNAPSHOT).unwrap();
        assert_eq!(snapshots.len(), 1);

        let snapshot = &snapshots[0];
        assert_eq!(snapshot.user_id, "athlete-1");
        assert_eq!(snapshot.hrv_ms, Some(55.0));
        assert!(snapshot.sleep_samples.is_empty());
        assert!(snapshot.workouts[0].laps.is_empty());
        assert!(Uuid::parse_str(&snapshot.workouts[0].id).is_ok());
    }

    #[test]
    fn test_snapshot_array() {
        let json = r#"[{"user_id": "a"}, {"user_id": "b"}]"#;
        let ids: Vec<String> = parse_snapshots(json).unwrap().into_iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_reversed_span_rejected() {
        let json = SNAPSHOT.replace("07:30:00Z", "06:30:00Z");
        let err = parse_snapshots(&json).unwrap_err();
        assert!(matches!(err, HyroxError::Import(ImportError::InvalidRecord { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_snapshots("{not json").unwrap_err();
        assert!(matches!(err, HyroxError::Import(ImportError::ParseError { .. })));
    }

    #[test]
    fn test_load_snapshot_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, SNAPSHOT).unwrap();

        assert_eq!(load_snapshot(&path).unwrap().user_id, "athlete-1");

        let missing = load_snapshot(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, HyroxError::Import(ImportError::FileNotFound { .. })));
    }

    #[test]
    fn test_segments_csv() {
        let csv = "station_name,segment_type,duration_seconds,timestamp\n\
                   Run 1,run,290.5,2024-06-10T09:00:00Z\n\
                   SkiErg, Station ,265,2024-06-10T09:05:00+02:00\n";
        let segments = parse_segments_csv(csv.as_bytes()).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment_type, SegmentType::Run);
        assert_eq!(segments[1].station_name, "SkiErg");
        assert_eq!(segments[1].segment_type, SegmentType::Station);
        assert_eq!(segments[1].timestamp.to_rfc3339(), "2024-06-10T07:05:00+00:00");
    }

    #[test]
    fn test_segments_csv_errors() {
        let bad_type = "station_name,segment_type,duration_seconds,timestamp\nX,swim,10,2024-06-10T09:00:00Z\n";
        assert!(parse_segments_csv(bad_type.as_bytes()).is_err());

        let bad_time = "station_name,segment_type,duration_seconds,timestamp\nX,run,10,yesterday\n";
        assert!(parse_segments_csv(bad_time.as_bytes()).is_err());

        let negative = "station_name,segment_type,duration_seconds,timestamp\nX,run,-3,2024-06-10T09:00:00Z\n";
        assert!(parse_segments_csv(negative.as_bytes()).is_err());
    }
}
