//! Error types for ingestion jobs.

use densify_data::DataError;
use densify_panel::PanelError;
use thiserror::Error;

/// Result type for job operations.
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can occur while running a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Source or store failure
    #[error(transparent)]
    Data(#[from] DataError),

    /// Panel construction failure
    #[error(transparent)]
    Panel(#[from] PanelError),

    /// No job with this name in the catalog
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The trading calendar has no dates on or after the requested start
    #[error("Trading calendar is empty from {0}")]
    EmptyCalendar(String),
}

impl JobError {
    /// Whether the error means a panel was never built.
    pub const fn is_store_missing(&self) -> bool {
        matches!(self, Self::Data(DataError::StoreMissing { .. }))
    }
}
