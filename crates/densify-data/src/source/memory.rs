//! In-memory record source.

use super::RecordSource;
use crate::error::{DataError, Result};
use densify_panel::{DateKey, RawRow, RecordBatch};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed table of rows held in memory.
///
/// Rows are returned sorted by entity then date, matching the SQLite source.
/// Every call to [`fetch`](RecordSource::fetch) is counted so tests can
/// assert that no-op updates never touch the source.
#[derive(Debug)]
pub struct MemoryRecordSource {
    factors: Vec<String>,
    rows: Vec<RawRow>,
    fetches: AtomicUsize,
}

impl MemoryRecordSource {
    /// Create a source whose rows carry one cell per entry of `factors`.
    pub fn new(factors: Vec<String>, rows: Vec<RawRow>) -> Result<Self> {
        let mut batch = RecordBatch::new(factors);
        for row in rows {
            batch.push(row)?;
        }
        let (factors, mut rows) = batch.into_parts();
        rows.sort_by(|a, b| {
            (&a.entity_id, a.effective_date).cmp(&(&b.entity_id, b.effective_date))
        });
        Ok(Self {
            factors,
            rows,
            fetches: AtomicUsize::new(0),
        })
    }

    /// Append rows, as if the table received new data.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = RawRow>) -> Result<()> {
        let mut batch = RecordBatch::new(self.factors.clone());
        for row in rows {
            batch.push(row)?;
        }
        self.rows.extend(batch.into_parts().1);
        self.rows.sort_by(|a, b| {
            (&a.entity_id, a.effective_date).cmp(&(&b.entity_id, b.effective_date))
        });
        Ok(())
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn project<'r>(
        &self,
        factors: &[String],
        rows: impl Iterator<Item = &'r RawRow>,
    ) -> Result<RecordBatch> {
        let indices = factors
            .iter()
            .map(|f| {
                self.factors
                    .iter()
                    .position(|c| c == f)
                    .ok_or_else(|| DataError::Schema(format!("unknown column {f}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut batch = RecordBatch::new(factors.to_vec());
        for row in rows {
            batch.push(RawRow {
                entity_id: row.entity_id.clone(),
                effective_date: row.effective_date,
                report_period: row.report_period,
                cells: indices.iter().map(|&i| row.cells[i].clone()).collect(),
            })?;
        }
        Ok(batch)
    }
}

impl RecordSource for MemoryRecordSource {
    fn fetch(&self, factors: &[String], from: DateKey) -> Result<RecordBatch> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.project(factors, self.rows.iter().filter(|r| r.effective_date >= from))
    }

    fn fetch_latest_before(&self, factors: &[String], before: DateKey) -> Result<RecordBatch> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let mut latest: HashMap<&str, DateKey> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.effective_date < before) {
            let date = latest.entry(row.entity_id.as_str()).or_insert(row.effective_date);
            *date = (*date).max(row.effective_date);
        }
        self.project(
            factors,
            self.rows
                .iter()
                .filter(|r| latest.get(r.entity_id.as_str()) == Some(&r.effective_date)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use densify_panel::{Cell, Value};

    fn row(entity: &str, date: &str, a: f64, b: f64) -> RawRow {
        RawRow {
            entity_id: entity.to_string(),
            effective_date: DateKey::parse(date).unwrap(),
            report_period: None,
            cells: vec![Cell::Value(Value::Number(a)), Cell::Value(Value::Number(b))],
        }
    }

    fn source() -> MemoryRecordSource {
        MemoryRecordSource::new(
            vec!["a".to_string(), "b".to_string()],
            vec![
                row("Y", "20160104", 1.0, 2.0),
                row("X", "20160105", 3.0, 4.0),
                row("X", "20151231", 5.0, 6.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_fetch_projects_and_filters() {
        let source = source();
        let batch = source
            .fetch(&["b".to_string()], DateKey::parse("20160101").unwrap())
            .unwrap();
        assert_eq!(batch.factors(), &["b"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows()[0].entity_id, "X");
        assert_eq!(batch.rows()[0].cells, vec![Cell::Value(Value::Number(4.0))]);
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_fetch_latest_before() {
        let source = source();
        let batch = source
            .fetch_latest_before(&["a".to_string()], DateKey::parse("20160105").unwrap())
            .unwrap();
        let entities: Vec<&str> = batch.rows().iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(entities, vec!["X", "Y"]);
        assert_eq!(batch.rows()[0].cells, vec![Cell::Value(Value::Number(5.0))]);
    }

    #[test]
    fn test_unknown_column() {
        let source = source();
        assert!(matches!(
            source.fetch(&["c".to_string()], DateKey::parse("20160101").unwrap()),
            Err(DataError::Schema(_))
        ));
    }
}
