#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/densify/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod jobs;

// Re-export main types from sub-crates
pub use densify_data as data;
pub use densify_panel as panel;

pub use jobs::{
    DEFAULT_BEGIN, JobError, JobOutcome, JobReport, JobRunner, JobSpec, PanelFailure,
    available_jobs, get_job, list_job_names,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
