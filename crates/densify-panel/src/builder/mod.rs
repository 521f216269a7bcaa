//! Panel builder: anchors sparse records onto the calendar and forward-fills.
//!
//! Two anchoring modes are supported:
//!
//! - [`AnchorMode::PointInTime`]: a record is visible from its effective date.
//! - [`AnchorMode::PeriodStart`]: a record is visible from the first trading
//!   date of its report year, and each fiscal season is built separately
//!   (see [`PanelBuilder::build_by_season`]).

mod fill;
mod period;

pub use fill::fill_column;
pub use period::split_by_season;

use crate::calendar::{DateKey, TradingCalendar};
use crate::cell::{Cell, Value};
use crate::error::{PanelError, Result};
use crate::panel::FactorPanel;
use crate::record::SparseRecord;
use crate::universe::SecurityUniverse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// How a record's anchor date is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorMode {
    /// Anchor at the record's effective date
    PointInTime,
    /// Anchor at the first trading date of the report year
    PeriodStart,
}

/// Builds dense panels for one calendar and universe.
#[derive(Debug, Clone, Copy)]
pub struct PanelBuilder<'a> {
    calendar: &'a TradingCalendar,
    universe: &'a SecurityUniverse,
    mode: AnchorMode,
}

impl<'a> PanelBuilder<'a> {
    /// Create a builder.
    pub const fn new(
        calendar: &'a TradingCalendar,
        universe: &'a SecurityUniverse,
        mode: AnchorMode,
    ) -> Self {
        Self {
            calendar,
            universe,
            mode,
        }
    }

    /// Anchoring mode.
    pub const fn mode(&self) -> AnchorMode {
        self.mode
    }

    /// Calendar the builder anchors against.
    pub const fn calendar(&self) -> &'a TradingCalendar {
        self.calendar
    }

    /// Universe defining the columns.
    pub const fn universe(&self) -> &'a SecurityUniverse {
        self.universe
    }

    /// Anchor key of `record`, or `None` if it never becomes visible.
    ///
    /// Point-in-time records anchor at their effective date (which need not be
    /// a trading date). Period records anchor at the first trading date on or
    /// after January 1st of their report year.
    pub fn anchor(&self, record: &SparseRecord) -> Result<Option<DateKey>> {
        match self.mode {
            AnchorMode::PointInTime => Ok(Some(record.effective_date)),
            AnchorMode::PeriodStart => {
                let period =
                    record
                        .report_period
                        .ok_or_else(|| PanelError::MissingReportPeriod {
                            entity_id: record.entity_id.clone(),
                        })?;
                Ok(DateKey::year_start(period.year)
                    .and_then(|start| self.calendar.first_on_or_after(start)))
            }
        }
    }

    /// Build a panel over the whole calendar.
    pub fn build(&self, records: Vec<SparseRecord>) -> Result<FactorPanel> {
        self.build_window(self.calendar.dates(), records, None)
    }

    /// Build a panel over `window`, a run of consecutive calendar dates.
    ///
    /// `seed`, when given, is the materialized row that precedes the window
    /// (one cell per universe member); each entity's walk starts from it.
    /// Records anchored before the window are folded into the starting value.
    pub fn build_window(
        &self,
        window: &[DateKey],
        records: Vec<SparseRecord>,
        seed: Option<&[Option<Value>]>,
    ) -> Result<FactorPanel> {
        if let Some(seed) = seed
            && seed.len() != self.universe.len()
        {
            return Err(PanelError::Shape {
                expected: self.universe.len(),
                actual: seed.len(),
            });
        }

        let mut panel = FactorPanel::empty(window.to_vec(), self.universe.ids().to_vec());
        if let Some(seed) = seed {
            for (col, value) in seed.iter().enumerate() {
                if value.is_some() {
                    panel.set_column(col, std::iter::repeat_n(value.clone(), window.len()));
                }
            }
        }

        let (by_entity, unanchored) = self.group(records)?;
        let mut unknown_entities = 0usize;

        for (entity_id, observations) in by_entity {
            let Some(col) = self.universe.position(&entity_id) else {
                unknown_entities += 1;
                continue;
            };
            let start = Cell::seed(seed.and_then(|s| s[col].as_ref()));
            let observations: Vec<(DateKey, Cell)> = observations.into_iter().collect();
            let filled = fill_column(window, &observations, start);
            panel.set_column(col, filled.into_iter().map(Cell::materialize));
        }

        if unknown_entities > 0 || unanchored > 0 {
            debug!(
                unknown_entities,
                unanchored, "records skipped while building panel"
            );
        }

        Ok(panel)
    }

    /// Group records by entity into ordered anchor → cell maps.
    ///
    /// Later records overwrite earlier ones with the same anchor, so ties
    /// resolve last-write-wins in input order.
    fn group(
        &self,
        records: Vec<SparseRecord>,
    ) -> Result<(BTreeMap<String, BTreeMap<DateKey, Cell>>, usize)> {
        let mut by_entity: BTreeMap<String, BTreeMap<DateKey, Cell>> = BTreeMap::new();
        let mut unanchored = 0usize;

        for record in records {
            let Some(anchor) = self.anchor(&record)? else {
                unanchored += 1;
                continue;
            };
            by_entity
                .entry(record.entity_id)
                .or_default()
                .insert(anchor, record.cell);
        }

        Ok((by_entity, unanchored))
    }
}
