//! Fan a multi-factor record batch out into one record stream per factor.

use crate::calendar::DateKey;
use crate::cell::Cell;
use crate::record::{RawRow, RecordBatch, ReportPeriod, SparseRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How duplicated `(entity, date)` rows collapse to a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// Largest non-null value; `Missing` when every duplicate is null
    Max,
    /// Last row in fetch order
    Last,
}

/// Splits a [`RecordBatch`] into per-factor [`SparseRecord`] streams.
#[derive(Debug, Clone, Copy)]
pub struct FactorSplitter {
    tie_break: TieBreak,
}

type GroupKey<'r> = (&'r str, DateKey, Option<ReportPeriod>);

fn group_key(row: &RawRow) -> GroupKey<'_> {
    (row.entity_id.as_str(), row.effective_date, row.report_period)
}

impl FactorSplitter {
    /// Create a splitter with the given tie-break.
    pub const fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Configured tie-break.
    pub const fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Split `batch` into `(factor, records)` pairs in batch factor order.
    ///
    /// Each stream holds one record per distinct `(entity, date, period)` and
    /// is sorted by entity then date, ready for the builder.
    pub fn split(&self, batch: RecordBatch) -> Vec<(String, Vec<SparseRecord>)> {
        let (factors, mut rows) = batch.into_parts();

        // Stable: duplicates keep fetch order.
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| group_key(&rows[a]).cmp(&group_key(&rows[b])));
        let group_sizes: Vec<usize> = order
            .chunk_by(|&a, &b| group_key(&rows[a]) == group_key(&rows[b]))
            .map(<[usize]>::len)
            .collect();

        let mut streams: Vec<Vec<SparseRecord>> = factors
            .iter()
            .map(|_| Vec::with_capacity(group_sizes.len()))
            .collect();

        let mut offset = 0;
        for size in &group_sizes {
            let group = &order[offset..offset + size];
            offset += size;

            let head = &rows[group[0]];
            let entity_id = head.entity_id.clone();
            let effective_date = head.effective_date;
            let report_period = head.report_period;

            for (factor, stream) in streams.iter_mut().enumerate() {
                // Each (row, factor) cell is chosen at most once, so it can be moved out.
                let cell = match self.pick(&rows, group, factor) {
                    Some(idx) => std::mem::take(&mut rows[idx].cells[factor]),
                    None => Cell::Missing,
                };
                stream.push(SparseRecord {
                    entity_id: entity_id.clone(),
                    effective_date,
                    report_period,
                    cell,
                });
            }
        }

        debug!(
            rows = rows.len(),
            groups = group_sizes.len(),
            factors = factors.len(),
            "split record batch"
        );

        factors.into_iter().zip(streams).collect()
    }

    /// Row (index into `rows`) whose cell represents `group` for `factor`.
    fn pick(&self, rows: &[RawRow], group: &[usize], factor: usize) -> Option<usize> {
        match self.tie_break {
            TieBreak::Last => group.last().copied(),
            TieBreak::Max => group
                .iter()
                .filter_map(|&i| rows[i].cells[factor].value().map(|v| (i, v)))
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i),
        }
    }
}
