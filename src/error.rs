//! Error types for index construction, catalog operations and persistence.
//!
//! Plan rewriting never produces user-facing errors: an ineligible plan is
//! simply left unchanged. Only structural inconsistencies surface as
//! [`GeoscanError::Internal`].

use geoscan_types::RowId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeoscanError>;

#[derive(Debug, Error)]
pub enum GeoscanError {
    /// The CREATE INDEX definition was rejected before any row was read.
    #[error("Invalid index definition: {0}")]
    InvalidIndexDefinition(String),

    /// Evaluating the index key expression failed; the whole build is aborted.
    #[error("Failed to evaluate index key for row {row_id}: {message}")]
    KeyEvaluation { row_id: RowId, message: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Expression evaluation failed outside of an index build.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot format")]
    InvalidFormat,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(feature = "snapshot")]
impl From<bincode::Error> for GeoscanError {
    fn from(err: bincode::Error) -> Self {
        GeoscanError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GeoscanError {
    fn from(err: serde_json::Error) -> Self {
        GeoscanError::Config(err.to_string())
    }
}
