//! Ingestion jobs: the catalog of sources and the runner that rebuilds or
//! extends their panels.

pub mod catalog;
pub mod error;
pub mod runner;

pub use catalog::{DEFAULT_BEGIN, JobSpec, available_jobs, get_job, list_job_names};
pub use error::{JobError, Result};
pub use runner::{JobOutcome, JobReport, JobRunner, PanelFailure};
