//! Sparse source records.
//!
//! A [`RecordBatch`] is what a source returns: one [`RawRow`] per source row,
//! carrying a cell for every requested factor. The splitter turns a batch into
//! one [`SparseRecord`] stream per factor.

use crate::calendar::DateKey;
use crate::cell::Cell;
use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fiscal season of a periodic report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    /// Period ending March 31st
    Q1,
    /// Period ending June 30th
    Q2,
    /// Period ending September 30th
    Q3,
    /// Period ending December 31st (annual report)
    Q4,
}

impl Season {
    /// All seasons in fiscal order.
    pub const ALL: [Self; 4] = [Self::Q1, Self::Q2, Self::Q3, Self::Q4];

    /// 1-based index used in panel keys.
    pub const fn index(&self) -> u8 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    /// Parse the `MMDD` suffix of a report period.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "0331" => Some(Self::Q1),
            "0630" => Some(Self::Q2),
            "0930" => Some(Self::Q3),
            "1231" => Some(Self::Q4),
            _ => None,
        }
    }

    /// The `MMDD` suffix of this season.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Q1 => "0331",
            Self::Q2 => "0630",
            Self::Q3 => "0930",
            Self::Q4 => "1231",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Fiscal period a report covers, e.g. `20161231`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// Fiscal year
    pub year: i32,
    /// Fiscal season
    pub season: Season,
}

impl ReportPeriod {
    /// Create a report period.
    pub const fn new(year: i32, season: Season) -> Self {
        Self { year, season }
    }

    /// Parse a `YYYYMMDD` report-period key.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PanelError::MalformedPeriod(raw.to_string()));
        }
        let year = raw[..4]
            .parse()
            .map_err(|_| PanelError::MalformedPeriod(raw.to_string()))?;
        let season = Season::from_suffix(&raw[4..])
            .ok_or_else(|| PanelError::MalformedPeriod(raw.to_string()))?;
        Ok(Self { year, season })
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.season.suffix())
    }
}

/// A single-factor observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRecord {
    /// Security identifier
    pub entity_id: String,
    /// Date the observation becomes effective
    pub effective_date: DateKey,
    /// Report period, for period-anchored sources
    pub report_period: Option<ReportPeriod>,
    /// Reported value
    pub cell: Cell,
}

impl SparseRecord {
    /// Point-in-time record.
    pub fn new(entity_id: impl Into<String>, effective_date: DateKey, cell: impl Into<Cell>) -> Self {
        Self {
            entity_id: entity_id.into(),
            effective_date,
            report_period: None,
            cell: cell.into(),
        }
    }

    /// Period-anchored record.
    pub fn periodic(
        entity_id: impl Into<String>,
        effective_date: DateKey,
        period: ReportPeriod,
        cell: impl Into<Cell>,
    ) -> Self {
        Self {
            report_period: Some(period),
            ..Self::new(entity_id, effective_date, cell)
        }
    }
}

/// One source row with a cell per requested factor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Security identifier
    pub entity_id: String,
    /// Effective (or report-period) date
    pub effective_date: DateKey,
    /// Report period, for period-anchored sources
    pub report_period: Option<ReportPeriod>,
    /// One cell per factor, in batch factor order
    pub cells: Vec<Cell>,
}

/// Rows fetched from a source for a fixed list of factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    factors: Vec<String>,
    rows: Vec<RawRow>,
}

impl RecordBatch {
    /// Empty batch for `factors`.
    pub const fn new(factors: Vec<String>) -> Self {
        Self {
            factors,
            rows: Vec::new(),
        }
    }

    /// Factor names in cell order.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// Rows in fetch order.
    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, checking its width.
    pub fn push(&mut self, row: RawRow) -> Result<()> {
        if row.cells.len() != self.factors.len() {
            return Err(PanelError::Shape {
                expected: self.factors.len(),
                actual: row.cells.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append every row of `other`, which must carry the same factors.
    pub fn append(&mut self, other: Self) -> Result<()> {
        if other.factors != self.factors {
            return Err(PanelError::ColumnMismatch(format!(
                "batch factors {:?} differ from {:?}",
                other.factors, self.factors
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Split into factor names and rows.
    pub fn into_parts(self) -> (Vec<String>, Vec<RawRow>) {
        (self.factors, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("20160331", 2016, Season::Q1)]
    #[case("20170630", 2017, Season::Q2)]
    #[case("20180930", 2018, Season::Q3)]
    #[case("20191231", 2019, Season::Q4)]
    fn test_parse_report_period(#[case] raw: &str, #[case] year: i32, #[case] season: Season) {
        let period = ReportPeriod::parse(raw).unwrap();
        assert_eq!(period, ReportPeriod::new(year, season));
        assert_eq!(period.to_string(), raw);
    }

    #[rstest]
    #[case("20160401")]
    #[case("2016331")]
    #[case("2016Q1xx")]
    fn test_parse_report_period_rejects(#[case] raw: &str) {
        assert!(matches!(
            ReportPeriod::parse(raw),
            Err(PanelError::MalformedPeriod(_))
        ));
    }

    #[test]
    fn test_season_index() {
        let indices: Vec<u8> = Season::ALL.iter().map(Season::index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_batch_push_checks_width() {
        let mut batch = RecordBatch::new(vec!["S_VAL_MV".to_string(), "S_DQ_MV".to_string()]);
        let row = RawRow {
            entity_id: "600373.SH".to_string(),
            effective_date: DateKey::parse("20160104").unwrap(),
            report_period: None,
            cells: vec![Cell::Missing],
        };
        assert!(matches!(
            batch.push(row),
            Err(PanelError::Shape {
                expected: 2,
                actual: 1
            })
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_append_requires_same_factors() {
        let mut a = RecordBatch::new(vec!["x".to_string()]);
        let b = RecordBatch::new(vec!["y".to_string()]);
        assert!(a.append(b).is_err());
        assert!(a.append(RecordBatch::new(vec!["x".to_string()])).is_ok());
    }
}
