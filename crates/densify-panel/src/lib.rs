#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/densify/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod calendar;
pub mod cell;
pub mod error;
pub mod merge;
pub mod panel;
pub mod record;
pub mod splitter;
pub mod universe;

pub use builder::{AnchorMode, PanelBuilder, fill_column, split_by_season};
pub use calendar::{DateKey, TradingCalendar};
pub use cell::{Cell, Value};
pub use error::{PanelError, Result};
pub use merge::{DeltaPlan, IncrementalMerger, MergeOutcome};
pub use panel::{FactorPanel, PanelSet, panel_key};
pub use record::{RawRow, RecordBatch, ReportPeriod, Season, SparseRecord};
pub use splitter::{FactorSplitter, TieBreak};
pub use universe::SecurityUniverse;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
