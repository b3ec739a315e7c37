//! Unified error hierarchy for hyroxrs
//!
//! Only genuinely invalid input is an error here. Missing or partial data
//! degrades to zeroed/`None` results inside the analyzers, implausible samples
//! are filtered, and duplicate ingestion is a no-op outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all hyroxrs operations
#[derive(Debug, Error)]
pub enum HyroxError {
    /// Analytics calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Record store errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Snapshot import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },
}

impl CalculationError {
    pub fn invalid(calculation: &str, parameter: &str, value: impl ToString) -> Self {
        CalculationError::InvalidParameter {
            calculation: calculation.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
        }
    }
}

/// Record store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection failed
    #[error("Database connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Query execution failed
    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    /// Stored row could not be decoded
    #[error("Corrupt record in {table}: {reason}")]
    CorruptRecord { table: String, reason: String },

    /// Lock poisoned by a panicking writer
    #[error("Store lock poisoned: {store}")]
    LockPoisoned { store: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::QueryFailed {
            reason: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for HyroxError {
    fn from(err: rusqlite::Error) -> Self {
        HyroxError::Database(err.into())
    }
}

/// Snapshot import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Format-specific parsing error
    #[error("Parse error in {format}: {reason}")]
    ParseError { format: String, reason: String },

    /// A record violated a data-model invariant
    #[error("Invalid record {record}: {reason}")]
    InvalidRecord { record: String, reason: String },
}

/// Result type alias for hyroxrs operations
pub type Result<T> = std::result::Result<T, HyroxError>;

impl HyroxError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HyroxError::Database(DatabaseError::ConnectionFailed { .. }) | HyroxError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            HyroxError::Calculation(_) => ErrorSeverity::Warning,
            HyroxError::Import(ImportError::FileNotFound { .. }) => ErrorSeverity::Warning,
            HyroxError::Database(DatabaseError::LockPoisoned { .. }) => ErrorSeverity::Critical,
            HyroxError::Database(_) => ErrorSeverity::Error,
            HyroxError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Message shown on the CLI
    pub fn user_message(&self) -> String {
        match self {
            HyroxError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find data file: {}", path.display())
            }
            HyroxError::Calculation(CalculationError::InvalidParameter {
                parameter, value, ..
            }) => {
                format!("The value {} is not valid for {}.", value, parameter)
            }
            HyroxError::Database(DatabaseError::ConnectionFailed { .. }) => {
                "Unable to open the workout store. Please check the database path.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// How loudly an error is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Store or process state can no longer be trusted
    Critical,
    Error,
    /// Bad input from the caller; the process itself is fine
    Warning,
}
