//! Job runner
//!
//! Drives one job end to end: fetch from the source, split per factor, build
//! or merge each panel, persist. A failure on one panel is recorded in the
//! report and does not stop the others; a failed fetch aborts the job.

use super::catalog::{DEFAULT_BEGIN, JobSpec};
use super::error::{JobError, Result};
use densify_data::{PanelStore, RecordSource};
use densify_panel::{
    AnchorMode, DateKey, FactorPanel, FactorSplitter, IncrementalMerger, MergeOutcome,
    PanelBuilder, RecordBatch, SecurityUniverse, SparseRecord, TradingCalendar, panel_key,
    split_by_season,
};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// What a job run did overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every panel was built from scratch
    Rebuilt,
    /// At least one panel was extended
    Updated,
    /// No panel needed new rows; nothing was fetched or written
    AlreadyUpToDate,
}

/// A panel that could not be built, merged or persisted.
#[derive(Debug)]
pub struct PanelFailure {
    /// Panel key (or factor name when the failure precedes the season split)
    pub key: String,
    /// Cause
    pub error: JobError,
}

/// Summary of one job run.
#[derive(Debug)]
pub struct JobReport {
    /// Job name
    pub job: String,
    /// Overall outcome
    pub outcome: JobOutcome,
    /// Panels persisted
    pub panels_written: usize,
    /// Source rows fetched, seed rows included
    pub records_fetched: usize,
    /// Per-panel failures, in panel order
    pub failures: Vec<PanelFailure>,
}

impl JobReport {
    /// Whether every panel succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// First recorded failure.
    pub fn first_failure(&self) -> Option<&PanelFailure> {
        self.failures.first()
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            JobOutcome::Rebuilt => "rebuilt",
            JobOutcome::Updated => "updated",
            JobOutcome::AlreadyUpToDate => "already up to date",
        };
        write!(
            f,
            "{}: {outcome}, {} panels written, {} records fetched",
            self.job, self.panels_written, self.records_fetched
        )?;
        if let Some(first) = self.first_failure() {
            write!(
                f,
                ", {} failed (first: {}: {})",
                self.failures.len(),
                first.key,
                first.error
            )?;
        }
        Ok(())
    }
}

/// A persisted panel that needs new rows.
struct PendingMerge {
    key: String,
    panel: FactorPanel,
    calendar: TradingCalendar,
    fetch_from: DateKey,
}

/// Runs jobs against one calendar and universe.
pub struct JobRunner<'a> {
    calendar: &'a TradingCalendar,
    universe: &'a SecurityUniverse,
    progress: Option<&'a ProgressBar>,
}

impl fmt::Debug for JobRunner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("calendar", &self.calendar.len())
            .field("universe", &self.universe.len())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<'a> JobRunner<'a> {
    /// Create a runner.
    pub const fn new(calendar: &'a TradingCalendar, universe: &'a SecurityUniverse) -> Self {
        Self {
            calendar,
            universe,
            progress: None,
        }
    }

    /// Report per-panel progress on `progress`.
    pub const fn with_progress(mut self, progress: &'a ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build every panel of `job` from `begin` and overwrite the stored ones.
    pub fn rebuild<S, P>(
        &self,
        job: &JobSpec,
        source: &S,
        store: &mut P,
        begin: DateKey,
    ) -> Result<JobReport>
    where
        S: RecordSource + ?Sized,
        P: PanelStore + ?Sized,
    {
        let calendar = self.calendar.since(begin);
        if calendar.is_empty() {
            return Err(JobError::EmptyCalendar(begin.to_string()));
        }
        info!(job = job.name, begin = %begin, dates = calendar.len(), "rebuilding job");

        let factors = job.factor_names();
        let fetch_from = history_start(job.anchor, begin);
        let mut batch = source.fetch(&factors, fetch_from)?;
        if job.seed_before_begin {
            let mut seeded = source.fetch_latest_before(&factors, fetch_from)?;
            debug!(job = job.name, rows = seeded.len(), "fetched carry-in rows");
            seeded.append(batch)?;
            batch = seeded;
        }
        let records_fetched = batch.len();
        info!(job = job.name, records = records_fetched, "fetched records");

        self.start_progress(job.panel_keys().len());
        let builder = PanelBuilder::new(&calendar, self.universe, job.anchor);
        let mut panels_written = 0;
        let mut failures = Vec::new();

        for (factor, records) in FactorSplitter::new(job.tie_break).split(batch) {
            let built: Result<Vec<(String, FactorPanel)>> = match job.anchor {
                AnchorMode::PointInTime => builder
                    .build(records)
                    .map(|panel| vec![(factor.clone(), panel)])
                    .map_err(JobError::from),
                AnchorMode::PeriodStart => builder
                    .build_by_season(records)
                    .map(|seasons| {
                        seasons
                            .into_iter()
                            .map(|(season, panel)| (panel_key(&factor, Some(season)), panel))
                            .collect()
                    })
                    .map_err(JobError::from),
            };

            match built {
                Ok(panels) => {
                    for (key, panel) in panels {
                        if self.persist(store, &key, &panel, &mut failures) {
                            panels_written += 1;
                        }
                    }
                }
                Err(error) => {
                    warn!(job = job.name, factor = %factor, error = %error, "build failed");
                    failures.push(PanelFailure { key: factor, error });
                }
            }
        }
        self.finish_progress();

        Ok(JobReport {
            job: job.name.to_string(),
            outcome: JobOutcome::Rebuilt,
            panels_written,
            records_fetched,
            failures,
        })
    }

    /// Append rows for new trading dates to every stored panel of `job`.
    ///
    /// Panels are read first; if none needs new rows the source is not
    /// queried and the store is not written. Otherwise a single fetch from
    /// the earliest bound any panel needs feeds every merge.
    ///
    /// A panel that was never built aborts the update with `StoreMissing`;
    /// run [`JobRunner::rebuild`] first.
    pub fn update<S, P>(&self, job: &JobSpec, source: &S, store: &mut P) -> Result<JobReport>
    where
        S: RecordSource + ?Sized,
        P: PanelStore + ?Sized,
    {
        let keys = job.panel_keys();
        let mut failures = Vec::new();
        let mut pending = Vec::new();

        for key in keys {
            match self.prepare(job, &*store, &key) {
                Ok(Some(merge)) => pending.push(merge),
                Ok(None) => debug!(key = %key, "panel already up to date"),
                Err(error) if error.is_store_missing() => {
                    warn!(job = job.name, key = %key, "panel not built, rebuild first");
                    return Err(error);
                }
                Err(error) => {
                    warn!(key = %key, error = %error, "cannot update panel");
                    failures.push(PanelFailure { key, error });
                }
            }
        }

        let Some(fetch_from) = pending.iter().map(|p| p.fetch_from).min() else {
            info!(job = job.name, "job already up to date");
            self.finish_progress();
            return Ok(JobReport {
                job: job.name.to_string(),
                outcome: JobOutcome::AlreadyUpToDate,
                panels_written: 0,
                records_fetched: 0,
                failures,
            });
        };
        info!(
            job = job.name,
            panels = pending.len(),
            from = %fetch_from,
            "updating job"
        );

        let factors = job.factor_names();
        let mut batch = source.fetch(&factors, fetch_from)?;
        if job.seed_before_begin && pending.iter().any(|p| p.panel.is_empty()) {
            let mut seeded = source.fetch_latest_before(&factors, fetch_from)?;
            seeded.append(batch)?;
            batch = seeded;
        }
        let records_fetched = batch.len();
        info!(job = job.name, records = records_fetched, "fetched records");

        let mut by_key = records_by_key(job, batch)?;

        self.start_progress(pending.len());
        let mut panels_written = 0;
        for merge in pending {
            let records = by_key.remove(&merge.key).unwrap_or_default();
            let merger = IncrementalMerger::new(&merge.calendar, self.universe, job.anchor);

            match merger.merge(merge.panel, records) {
                Ok(MergeOutcome::Extended {
                    panel,
                    rows_appended,
                }) => {
                    debug!(key = %merge.key, rows = rows_appended, "merged delta");
                    if self.persist(store, &merge.key, &panel, &mut failures) {
                        panels_written += 1;
                    }
                }
                Ok(MergeOutcome::AlreadyUpToDate) => self.tick(&merge.key),
                Err(error) => {
                    warn!(key = %merge.key, error = %error, "merge failed");
                    self.tick(&merge.key);
                    failures.push(PanelFailure {
                        key: merge.key,
                        error: error.into(),
                    });
                }
            }
        }
        self.finish_progress();

        Ok(JobReport {
            job: job.name.to_string(),
            outcome: JobOutcome::Updated,
            panels_written,
            records_fetched,
            failures,
        })
    }

    /// Read `key` and work out whether and from where it needs records.
    fn prepare<P>(&self, job: &JobSpec, store: &P, key: &str) -> Result<Option<PendingMerge>>
    where
        P: PanelStore + ?Sized,
    {
        let panel = store.read(key)?;
        let start = panel.dates().first().copied().unwrap_or(DEFAULT_BEGIN);
        let calendar = self.calendar.since(start);

        let merger = IncrementalMerger::new(&calendar, self.universe, job.anchor);
        let plan = merger.plan(&panel)?;
        if plan.is_up_to_date() {
            return Ok(None);
        }
        let fetch_from = plan
            .fetch_from(job.anchor)
            .unwrap_or_else(|| history_start(job.anchor, start));

        Ok(Some(PendingMerge {
            key: key.to_string(),
            panel,
            calendar,
            fetch_from,
        }))
    }

    /// Write one panel, recording a failure instead of returning it.
    fn persist<P>(
        &self,
        store: &mut P,
        key: &str,
        panel: &FactorPanel,
        failures: &mut Vec<PanelFailure>,
    ) -> bool
    where
        P: PanelStore + ?Sized,
    {
        self.tick(key);
        match store.write(key, panel) {
            Ok(()) => {
                info!(key, rows = panel.n_rows(), cols = panel.n_cols(), "persisted panel");
                true
            }
            Err(error) => {
                warn!(key, error = %error, "write failed");
                failures.push(PanelFailure {
                    key: key.to_string(),
                    error: error.into(),
                });
                false
            }
        }
    }

    fn start_progress(&self, total: usize) {
        if let Some(pb) = self.progress {
            pb.set_length(total as u64);
            pb.set_position(0);
        }
    }

    fn tick(&self, key: &str) {
        if let Some(pb) = self.progress {
            pb.set_message(key.to_string());
            pb.inc(1);
        }
    }

    fn finish_progress(&self) {
        if let Some(pb) = self.progress {
            pb.finish_with_message("done");
        }
    }
}

/// Lowest source key a build starting at `begin` needs.
///
/// Report periods of `begin`'s year anchor at that year's first trading date,
/// so a period build needs them even when `begin` is later in the year.
fn history_start(anchor: AnchorMode, begin: DateKey) -> DateKey {
    match anchor {
        AnchorMode::PointInTime => begin,
        AnchorMode::PeriodStart => DateKey::year_start(begin.year()).unwrap_or(begin),
    }
}

/// Split a batch and index the record streams by panel key.
fn records_by_key(job: &JobSpec, batch: RecordBatch) -> Result<HashMap<String, Vec<SparseRecord>>> {
    let mut by_key = HashMap::new();
    for (factor, records) in FactorSplitter::new(job.tie_break).split(batch) {
        match job.anchor {
            AnchorMode::PointInTime => {
                by_key.insert(factor, records);
            }
            AnchorMode::PeriodStart => {
                for (season, records) in split_by_season(records)? {
                    by_key.insert(panel_key(&factor, Some(season)), records);
                }
            }
        }
    }
    Ok(by_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::catalog::get_job;
    use densify_data::{DataError, MemoryPanelStore, MemoryRecordSource};
    use densify_panel::{Cell, RawRow, ReportPeriod, Value};

    fn key(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    fn row(entity: &str, date: &str, v: f64) -> RawRow {
        RawRow {
            entity_id: entity.to_string(),
            effective_date: key(date),
            report_period: None,
            cells: vec![Cell::Value(Value::Number(v))],
        }
    }

    fn calendar() -> TradingCalendar {
        TradingCalendar::parse(["20151231", "20160104", "20160105", "20160106"]).unwrap()
    }

    fn universe() -> SecurityUniverse {
        SecurityUniverse::new(["000001.SZ", "000002.SZ"])
    }

    fn holders(rows: Vec<RawRow>) -> MemoryRecordSource {
        MemoryRecordSource::new(vec!["S_HOLDER_NUM".to_string()], rows).unwrap()
    }

    #[test]
    fn test_rebuild_seeds_from_before_begin() {
        let job = get_job("holder_number").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let source = holders(vec![
            row("000001.SZ", "20151120", 90.0),
            row("000001.SZ", "20151231", 100.0),
            row("000002.SZ", "20160105", 7.0),
        ]);
        let mut store = MemoryPanelStore::new();

        let report = JobRunner::new(&calendar, &universe)
            .rebuild(&job, &source, &mut store, key("20160101"))
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::Rebuilt);
        assert_eq!(report.panels_written, 1);
        assert_eq!(report.records_fetched, 2);
        assert!(report.is_success());

        let panel = store.read("S_HOLDER_NUM").unwrap();
        assert_eq!(panel.dates().first(), Some(&key("20160104")));
        assert_eq!(panel.value(key("20160104"), "000001.SZ"), Some(&Value::Number(100.0)));
        assert_eq!(panel.value(key("20160104"), "000002.SZ"), None);
        assert_eq!(panel.value(key("20160106"), "000002.SZ"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn test_rebuild_past_calendar_end() {
        let job = get_job("holder_number").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let mut store = MemoryPanelStore::new();
        let result = JobRunner::new(&calendar, &universe).rebuild(
            &job,
            &holders(Vec::new()),
            &mut store,
            key("20170101"),
        );
        assert!(matches!(result, Err(JobError::EmptyCalendar(_))));
    }

    #[test]
    fn test_update_without_rebuild_is_store_missing() {
        let job = get_job("holder_number").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let source = holders(vec![row("000001.SZ", "20160104", 1.0)]);
        let mut store = MemoryPanelStore::new();

        let result = JobRunner::new(&calendar, &universe).update(&job, &source, &mut store);
        assert!(result.unwrap_err().is_store_missing());
        assert_eq!(source.fetch_count(), 0);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_update_with_one_season_missing_fails() {
        let job = get_job("ann_financial_indicator").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let source = MemoryRecordSource::new(job.factor_names(), Vec::new()).unwrap();
        let mut store = MemoryPanelStore::new();
        let runner = JobRunner::new(&calendar, &universe);

        runner.rebuild(&job, &source, &mut store, key("20160101")).unwrap();
        store.remove("S_FA_EPS_DILUTED_3").unwrap();
        let writes = store.write_count();

        let result = runner.update(&job, &source, &mut store);
        assert!(result.unwrap_err().is_store_missing());
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_update_is_noop_when_current() {
        let job = get_job("holder_number").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let source = holders(vec![row("000001.SZ", "20160104", 1.0)]);
        let mut store = MemoryPanelStore::new();
        let runner = JobRunner::new(&calendar, &universe);

        runner.rebuild(&job, &source, &mut store, key("20160101")).unwrap();
        let fetches = source.fetch_count();
        let writes = store.write_count();

        let report = runner.update(&job, &source, &mut store).unwrap();
        assert_eq!(report.outcome, JobOutcome::AlreadyUpToDate);
        assert_eq!(report.panels_written, 0);
        assert_eq!(source.fetch_count(), fetches);
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_update_extends_with_new_dates() {
        let job = get_job("holder_number").unwrap();
        let universe = universe();
        let mut source = holders(vec![row("000001.SZ", "20160104", 1.0)]);
        let mut store = MemoryPanelStore::new();

        let short = TradingCalendar::parse(["20160104", "20160105"]).unwrap();
        JobRunner::new(&short, &universe)
            .rebuild(&job, &source, &mut store, key("20160101"))
            .unwrap();

        // Announced on a Saturday between the last stored date and the next trading date.
        source.extend(vec![row("000001.SZ", "20160109", 2.0)]).unwrap();
        let long = TradingCalendar::parse(["20160104", "20160105", "20160111"]).unwrap();
        let report = JobRunner::new(&long, &universe)
            .update(&job, &source, &mut store)
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::Updated);
        assert_eq!(report.panels_written, 1);

        let panel = store.read("S_HOLDER_NUM").unwrap();
        assert_eq!(panel.n_rows(), 3);
        assert_eq!(panel.value(key("20160105"), "000001.SZ"), Some(&Value::Number(1.0)));
        assert_eq!(panel.value(key("20160111"), "000001.SZ"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_period_rebuild_writes_every_season() {
        let job = get_job("ann_financial_indicator").unwrap();
        let (calendar, universe) = (calendar(), universe());
        let factors = job.factor_names();
        let period = ReportPeriod::parse("20160331").unwrap();
        let mut cells = vec![Cell::Missing; factors.len()];
        cells[0] = Cell::Value(Value::Number(0.5));
        let source = MemoryRecordSource::new(
            factors,
            vec![RawRow {
                entity_id: "000001.SZ".to_string(),
                effective_date: key("20160331"),
                report_period: Some(period),
                cells,
            }],
        )
        .unwrap();
        let mut store = MemoryPanelStore::new();

        let report = JobRunner::new(&calendar, &universe)
            .rebuild(&job, &source, &mut store, key("20160101"))
            .unwrap();
        assert_eq!(report.panels_written, job.panel_keys().len());

        let q1 = store.read("S_FA_EPS_DILUTED_1").unwrap();
        assert_eq!(q1.value(key("20160104"), "000001.SZ"), Some(&Value::Number(0.5)));
        let q2 = store.read("S_FA_EPS_DILUTED_2").unwrap();
        assert_eq!(q2.value(key("20160104"), "000001.SZ"), None);
        assert!(matches!(
            store.read("S_FA_EPS_DILUTED_5"),
            Err(DataError::StoreMissing { .. })
        ));
    }

    #[test]
    fn test_history_start() {
        assert_eq!(
            history_start(AnchorMode::PeriodStart, key("20160615")),
            key("20160101")
        );
        assert_eq!(
            history_start(AnchorMode::PointInTime, key("20160615")),
            key("20160615")
        );
    }

    #[test]
    fn test_report_display() {
        let report = JobReport {
            job: "float_volume".to_string(),
            outcome: JobOutcome::AlreadyUpToDate,
            panels_written: 0,
            records_fetched: 0,
            failures: vec![PanelFailure {
                key: "FLOAT_A_SHR".to_string(),
                error: JobError::UnknownJob("x".to_string()),
            }],
        };
        let text = report.to_string();
        assert!(text.starts_with("float_volume: already up to date"));
        assert!(text.contains("1 failed (first: FLOAT_A_SHR"));
    }
}
