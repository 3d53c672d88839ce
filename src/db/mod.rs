pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Invalid JSON in column {column}: {reason}")]
    InvalidJson { column: String, reason: String },
}

/// Current UTC time in the fixed-width RFC 3339 form stored in every
/// timestamp column. Fixed width keeps lexicographic order chronological.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Stored timestamp as float UNIX seconds, the form the API exposes.
pub fn epoch_seconds(ts: &str) -> f64 {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.timestamp_micros() as f64 / 1_000_000.0)
        .unwrap_or(0.0)
}
