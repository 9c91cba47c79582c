//! Error types for cta-types crate.

use thiserror::Error;

/// Errors raised while building or validating records.
#[derive(Error, Debug)]
pub enum TypesError {
    #[error("Station {station_id} has none of the red, blue or green line flags set")]
    NoLineFlag { station_id: i64 },

    #[error("Failed to parse schema '{name}': {source}")]
    SchemaParse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Value does not match schema '{schema}': {message}")]
    SchemaMismatch { schema: String, message: String },

    #[error("Unknown line name: {0}")]
    UnknownLine(String),

    #[error("Invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cta-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;
