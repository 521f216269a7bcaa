#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/densify/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod export;
pub mod source;
pub mod store;

pub use error::{DataError, Result};
pub use export::{ExportFormat, export_to_file, export_to_string, panel_to_dataframe};
pub use source::{
    DEFAULT_PAGE_SIZE, MemoryRecordSource, RecordSource, SourceDb, SqliteRecordSource, TableSpec,
};
pub use store::{MemoryPanelStore, PanelStore, SqlitePanelStore, StoreStats};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
