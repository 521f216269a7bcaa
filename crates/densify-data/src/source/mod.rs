//! Record sources.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordSource;
pub use sqlite::{SourceDb, SqliteRecordSource, TableSpec};

use crate::error::Result;
use densify_panel::{DateKey, RecordBatch};

/// Default number of rows per page for paginated fetches.
pub const DEFAULT_PAGE_SIZE: usize = 1_000_000;

/// A relational table of sparse, multi-factor records.
pub trait RecordSource {
    /// Rows dated on or after `from`, in a stable order.
    ///
    /// For period-anchored sources `from` bounds the report period and every
    /// row carries its [`ReportPeriod`](densify_panel::ReportPeriod).
    fn fetch(&self, factors: &[String], from: DateKey) -> Result<RecordBatch>;

    /// For every entity, the rows of its latest date strictly before `before`.
    fn fetch_latest_before(&self, factors: &[String], before: DateKey) -> Result<RecordBatch>;
}
