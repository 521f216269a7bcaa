//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while fetching records or persisting panels.
#[derive(Debug, Error)]
pub enum DataError {
    /// The record source could not be opened or queried
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// An incremental update found no persisted panel
    #[error("No stored panel for key {key}")]
    StoreMissing {
        /// Panel key that was looked up
        key: String,
    },

    /// A column had a type or name the reader cannot handle
    #[error("Schema error: {0}")]
    Schema(String),

    /// Panel construction error
    #[error(transparent)]
    Panel(#[from] densify_panel::PanelError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV serialization error
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
