//! densify CLI binary.
//!
//! Rebuilds, updates, inspects and exports factor panels.

mod integration;
mod observability;

use clap::{Parser, Subcommand};
use densify::{DEFAULT_BEGIN, JobError, JobReport, JobRunner, JobSpec, available_jobs, get_job};
use densify_data::{ExportFormat, PanelStore, export_to_file, panel_to_dataframe};
use densify_panel::{AnchorMode, DateKey};
use indicatif::{ProgressBar, ProgressStyle};
use integration::store_paths::{open_source, open_store, source_path, store_path};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "densify")]
#[command(about = "densify: dense, calendar-aligned factor panels from sparse records", long_about = None)]
#[command(version)]
struct Cli {
    /// Source SQLite database (defaults to $DENSIFY_SOURCE_DB or the cache dir)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Panel SQLite database (defaults to $DENSIFY_STORE_DB or the cache dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Rows fetched per source page
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Log filter, overriding $DENSIFY_LOG_LEVEL
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available jobs
    Jobs,

    /// Rebuild every panel of a job from scratch
    Rebuild {
        /// Job name
        job: String,

        /// First date to materialize (YYYYMMDD)
        #[arg(long)]
        begin: Option<String>,
    },

    /// Append new trading dates to every panel of a job
    Update {
        /// Job name
        job: String,
    },

    /// Print the last rows of a stored panel as a table
    Show {
        /// Panel key
        key: String,

        /// Number of rows to print
        #[arg(long, default_value = "5")]
        rows: usize,
    },

    /// Write a stored panel to a file
    Export {
        /// Panel key
        key: String,

        /// Output file
        path: PathBuf,

        /// Output format (csv or json); guessed from the extension if omitted
        #[arg(long)]
        format: Option<String>,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Rebuild { .. } => "rebuild",
            Self::Update { .. } => "update",
            Self::Show { .. } => "show",
            Self::Export { .. } => "export",
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut logging = observability::logging_config_from_env();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    observability::init_logging(&logging)?;
    observability::log_app_start(&logging, cli.command.name());

    match cli.command {
        Commands::Jobs => list_jobs(),
        Commands::Rebuild { job, begin } => {
            let job = find_job(&job)?;
            let begin = match begin {
                Some(raw) => DateKey::parse(&raw)?,
                None => DEFAULT_BEGIN,
            };
            let db = open_source(&source_path(cli.source), cli.page_size)?;
            let (calendar, universe) = (db.calendar()?, db.universe()?);
            let mut store = open_store(&store_path(cli.store))?;

            let pb = progress_bar(job.panel_keys().len(), "Rebuilding")?;
            let report = JobRunner::new(&calendar, &universe)
                .with_progress(&pb)
                .rebuild(&job, &db.table(job.table_spec()), &mut store, begin)?;
            finish(report)?;
        }
        Commands::Update { job } => {
            let job = find_job(&job)?;
            let db = open_source(&source_path(cli.source), cli.page_size)?;
            let (calendar, universe) = (db.calendar()?, db.universe()?);
            let mut store = open_store(&store_path(cli.store))?;

            let pb = progress_bar(job.panel_keys().len(), "Updating")?;
            let report = JobRunner::new(&calendar, &universe)
                .with_progress(&pb)
                .update(&job, &db.table(job.table_spec()), &mut store)?;
            finish(report)?;
        }
        Commands::Show { key, rows } => {
            let store = open_store(&store_path(cli.store))?;
            let panel = store.read(&key)?;
            println!(
                "{}: {} dates x {} securities",
                key,
                panel.n_rows(),
                panel.n_cols()
            );
            if let (Some(first), Some(last)) = (panel.dates().first(), panel.last_date()) {
                println!("  Range: {} - {}", first, last);
            }
            println!("{}", panel_to_dataframe(&panel.tail(rows))?);
        }
        Commands::Export { key, path, format } => {
            let format = match format.as_deref() {
                Some(raw) => parse_format(raw)?,
                None => ExportFormat::from_path(&path),
            };
            let store = open_store(&store_path(cli.store))?;
            let panel = store.read(&key)?;
            export_to_file(&panel, &path, format)?;
            println!(
                "Exported {} ({} rows) to {}",
                key,
                panel.n_rows(),
                path.display()
            );
        }
    }

    Ok(())
}

fn list_jobs() {
    println!("Available jobs:\n");
    for job in available_jobs() {
        let mode = match job.anchor {
            AnchorMode::PointInTime => "point-in-time",
            AnchorMode::PeriodStart => "report period",
        };
        println!("  {:<26} {}", job.name, job.description);
        println!(
            "  {:<26} {} ({}), {} factors, {} panels",
            "",
            job.table,
            mode,
            job.factors.len(),
            job.panel_keys().len()
        );
    }
}

fn find_job(name: &str) -> Result<JobSpec, JobError> {
    get_job(name).ok_or_else(|| JobError::UnknownJob(name.to_string()))
}

fn parse_format(raw: &str) -> Result<ExportFormat, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "csv" => Ok(ExportFormat::Csv),
        "json" => Ok(ExportFormat::Json),
        other => Err(format!("unsupported export format: {other}")),
    }
}

fn progress_bar(len: usize, message: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Print the report; any panel failure fails the command.
fn finish(report: JobReport) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", report);
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.key, failure.error);
    }
    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{}: {} panels failed", report.job, report.failures.len()).into())
    }
}
