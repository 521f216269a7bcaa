//! Dense date × security panels.

use crate::calendar::DateKey;
use crate::cell::Value;
use crate::error::{PanelError, Result};
use crate::universe::SecurityUniverse;
use std::collections::BTreeMap;

/// Dense matrix for one factor: rows are trading dates, columns are securities.
///
/// Cells live in a single row-major buffer sized `rows × columns` up front.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorPanel {
    dates: Vec<DateKey>,
    columns: Vec<String>,
    cells: Vec<Option<Value>>,
}

impl FactorPanel {
    /// All-null panel over `dates` × `columns`.
    pub fn empty(dates: Vec<DateKey>, columns: Vec<String>) -> Self {
        let cells = vec![None; dates.len() * columns.len()];
        Self {
            dates,
            columns,
            cells,
        }
    }

    /// Panel from explicit rows. Every row must have one cell per column and
    /// dates must be strictly ascending.
    pub fn from_rows(
        dates: Vec<DateKey>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<Value>>>,
    ) -> Result<Self> {
        if rows.len() != dates.len() {
            return Err(PanelError::Shape {
                expected: dates.len(),
                actual: rows.len(),
            });
        }
        check_ascending(&dates)?;

        let mut cells = Vec::with_capacity(dates.len() * columns.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(PanelError::Shape {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            cells.extend(row);
        }

        Ok(Self {
            dates,
            columns,
            cells,
        })
    }

    /// Row dates.
    pub fn dates(&self) -> &[DateKey] {
        &self.dates
    }

    /// Column identifiers.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Whether the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Last row date.
    pub fn last_date(&self) -> Option<DateKey> {
        self.dates.last().copied()
    }

    /// Cell at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row >= self.n_rows() || col >= self.n_cols() {
            return None;
        }
        self.cells[row * self.n_cols() + col].as_ref()
    }

    /// Cell for `date` and `entity_id`.
    pub fn value(&self, date: DateKey, entity_id: &str) -> Option<&Value> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.columns.iter().position(|c| c == entity_id)?;
        self.get(row, col)
    }

    /// Row `row` as a slice.
    pub fn row(&self, row: usize) -> &[Option<Value>] {
        let width = self.n_cols();
        &self.cells[row * width..(row + 1) * width]
    }

    /// Last row, if any.
    pub fn last_row(&self) -> Option<&[Option<Value>]> {
        self.n_rows().checked_sub(1).map(|r| self.row(r))
    }

    /// Rows paired with their dates.
    pub fn rows(&self) -> impl Iterator<Item = (DateKey, &[Option<Value>])> + '_ {
        (0..self.n_rows()).map(move |r| (self.dates[r], self.row(r)))
    }

    /// Overwrite column `col` from the top with `values`.
    pub fn set_column(&mut self, col: usize, values: impl IntoIterator<Item = Option<Value>>) {
        let width = self.n_cols();
        for (row, value) in values.into_iter().take(self.n_rows()).enumerate() {
            self.cells[row * width + col] = value;
        }
    }

    /// The last `n` rows.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.n_rows().saturating_sub(n);
        Self {
            dates: self.dates[start..].to_vec(),
            columns: self.columns.clone(),
            cells: self.cells[start * self.n_cols()..].to_vec(),
        }
    }

    /// Append `other`'s rows after this panel's rows.
    ///
    /// Both panels must share the same columns and `other` must start after
    /// this panel's last date.
    pub fn append(&mut self, other: Self) -> Result<()> {
        if other.columns != self.columns {
            return Err(PanelError::ColumnMismatch(format!(
                "appending {} columns onto {}",
                other.n_cols(),
                self.n_cols()
            )));
        }
        if let (Some(last), Some(next)) = (self.last_date(), other.dates.first())
            && *next <= last
        {
            return Err(PanelError::NonAscending {
                last: last.to_string(),
                next: next.to_string(),
            });
        }

        self.dates.extend(other.dates);
        self.cells.extend(other.cells);
        Ok(())
    }

    /// Re-index columns to `universe`.
    ///
    /// Securities new to the universe get all-null columns; securities no
    /// longer in the universe are dropped.
    pub fn reindex_columns(&self, universe: &SecurityUniverse) -> Self {
        let mapping: Vec<Option<usize>> = universe
            .ids()
            .iter()
            .map(|id| self.columns.iter().position(|c| c == id))
            .collect();

        let mut cells = Vec::with_capacity(self.n_rows() * universe.len());
        for row in 0..self.n_rows() {
            let src = self.row(row);
            cells.extend(mapping.iter().map(|m| m.and_then(|c| src[c].clone())));
        }

        Self {
            dates: self.dates.clone(),
            columns: universe.ids().to_vec(),
            cells,
        }
    }

    /// Whether the columns are exactly `universe` in order.
    pub fn matches_universe(&self, universe: &SecurityUniverse) -> bool {
        self.columns == universe.ids()
    }
}

fn check_ascending(dates: &[DateKey]) -> Result<()> {
    match dates.windows(2).find(|w| w[1] <= w[0]) {
        Some(w) => Err(PanelError::NonAscending {
            last: w[0].to_string(),
            next: w[1].to_string(),
        }),
        None => Ok(()),
    }
}

/// Panels of one source, keyed by panel key.
pub type PanelSet = BTreeMap<String, FactorPanel>;

/// Store key for a factor, suffixed with the season index for period sources.
pub fn panel_key(factor: &str, season: Option<crate::record::Season>) -> String {
    match season {
        Some(season) => format!("{factor}_{}", season.index()),
        None => factor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Season;

    fn key(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    fn sample() -> FactorPanel {
        FactorPanel::from_rows(
            vec![key("20160104"), key("20160105")],
            vec!["A".to_string(), "B".to_string()],
            vec![
                vec![Some(1.0.into()), None],
                vec![Some(2.0.into()), Some(5.0.into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_checks_shape() {
        let err = FactorPanel::from_rows(
            vec![key("20160104")],
            vec!["A".to_string(), "B".to_string()],
            vec![vec![None]],
        );
        assert!(matches!(
            err,
            Err(PanelError::Shape {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_from_rows_checks_order() {
        let err = FactorPanel::from_rows(
            vec![key("20160105"), key("20160104")],
            vec!["A".to_string()],
            vec![vec![None], vec![None]],
        );
        assert!(matches!(err, Err(PanelError::NonAscending { .. })));
    }

    #[test]
    fn test_accessors() {
        let panel = sample();
        assert_eq!(panel.n_rows(), 2);
        assert_eq!(panel.n_cols(), 2);
        assert_eq!(panel.get(0, 1), None);
        assert_eq!(panel.value(key("20160105"), "B"), Some(&Value::Number(5.0)));
        assert_eq!(panel.value(key("20160106"), "B"), None);
        assert_eq!(panel.last_date(), Some(key("20160105")));
        assert_eq!(panel.last_row().unwrap()[0], Some(Value::Number(2.0)));
        assert_eq!(panel.rows().count(), 2);
    }

    #[test]
    fn test_append() {
        let mut panel = sample();
        let next = FactorPanel::from_rows(
            vec![key("20160106")],
            vec!["A".to_string(), "B".to_string()],
            vec![vec![Some(3.0.into()), Some(5.0.into())]],
        )
        .unwrap();
        panel.append(next).unwrap();
        assert_eq!(panel.n_rows(), 3);
        assert_eq!(panel.value(key("20160106"), "A"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_append_rejects_overlap_and_column_drift() {
        let mut panel = sample();
        let overlap = FactorPanel::empty(vec![key("20160105")], panel.columns().to_vec());
        assert!(matches!(
            panel.append(overlap),
            Err(PanelError::NonAscending { .. })
        ));

        let drift = FactorPanel::empty(vec![key("20160106")], vec!["A".to_string()]);
        assert!(matches!(
            panel.append(drift),
            Err(PanelError::ColumnMismatch(_))
        ));
        assert_eq!(panel.n_rows(), 2);
    }

    #[test]
    fn test_reindex_columns() {
        let panel = sample();
        let universe = SecurityUniverse::new(["C", "B"]);
        let reindexed = panel.reindex_columns(&universe);
        assert!(reindexed.matches_universe(&universe));
        assert_eq!(reindexed.get(1, 0), None);
        assert_eq!(reindexed.get(1, 1), Some(&Value::Number(5.0)));
    }

    #[test]
    fn test_tail() {
        let tail = sample().tail(1);
        assert_eq!(tail.dates(), &[key("20160105")]);
        assert_eq!(tail.row(0), sample().row(1));
        assert_eq!(sample().tail(10).n_rows(), 2);
    }

    #[test]
    fn test_panel_key() {
        assert_eq!(panel_key("S_HOLDER_NUM", None), "S_HOLDER_NUM");
        assert_eq!(panel_key("ROE_DILUTED", Some(Season::Q4)), "ROE_DILUTED_4");
    }
}
