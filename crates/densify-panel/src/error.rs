//! Error types for panel construction.

use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while anchoring, filling or merging panels.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A date key could not be parsed
    #[error("Invalid date key: {0}")]
    InvalidDateKey(String),

    /// A report period key did not name a known fiscal season
    #[error("Malformed report period: {0}")]
    MalformedPeriod(String),

    /// A period-anchored record arrived without its report period
    #[error("Record for {entity_id} has no report period")]
    MissingReportPeriod {
        /// Entity the record belongs to
        entity_id: String,
    },

    /// A row had the wrong number of cells
    #[error("Shape mismatch: expected {expected} cells, found {actual}")]
    Shape {
        /// Expected cell count
        expected: usize,
        /// Actual cell count
        actual: usize,
    },

    /// Two panels disagree on their column order
    #[error("Column mismatch: {0}")]
    ColumnMismatch(String),

    /// Persisted rows are not a prefix of the trading calendar
    #[error("Calendar mismatch at {date}: {reason}")]
    CalendarMismatch {
        /// First offending date
        date: String,
        /// What went wrong
        reason: String,
    },

    /// Rows appended out of calendar order
    #[error("Rows out of order: {next} does not follow {last}")]
    NonAscending {
        /// Last date already present
        last: String,
        /// First date being appended
        next: String,
    },
}
