//! Incremental extension of persisted panels.
//!
//! A persisted panel is only ever extended at its tail: the merger works out
//! which calendar dates are new, builds a delta over exactly those dates
//! seeded from the persisted last row, and appends it.

use crate::builder::{AnchorMode, PanelBuilder, split_by_season};
use crate::calendar::{DateKey, TradingCalendar};
use crate::error::Result;
use crate::panel::FactorPanel;
use crate::record::{Season, SparseRecord};
use crate::universe::SecurityUniverse;
use tracing::{debug, warn};

/// What an update has to do for one persisted panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaPlan<'a> {
    /// The panel already covers the whole calendar
    AlreadyUpToDate,
    /// Rows for `new_dates` must be appended
    Extend {
        /// Last persisted date, `None` for an empty panel
        last_known: Option<DateKey>,
        /// Calendar dates after `last_known`
        new_dates: &'a [DateKey],
    },
}

impl DeltaPlan<'_> {
    /// Lower bound for the source fetch, `None` when the whole history is needed.
    ///
    /// Point-in-time sources fetch from the day after the last persisted date
    /// so that records dated on non-trading days in between are not lost.
    /// Period sources fetch report periods from January 1st of the first new
    /// date's year.
    pub fn fetch_from(&self, mode: AnchorMode) -> Option<DateKey> {
        match self {
            Self::AlreadyUpToDate => None,
            Self::Extend {
                last_known: None, ..
            } => None,
            Self::Extend {
                last_known: Some(last),
                new_dates,
            } => match mode {
                AnchorMode::PointInTime => last.next_day(),
                AnchorMode::PeriodStart => new_dates
                    .first()
                    .and_then(|first| DateKey::year_start(first.year())),
            },
        }
    }

    /// Whether nothing has to be done.
    pub const fn is_up_to_date(&self) -> bool {
        matches!(self, Self::AlreadyUpToDate)
    }
}

/// Result of merging one panel.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Nothing to append; the stored panel must be left untouched
    AlreadyUpToDate,
    /// The extended panel, ready to be persisted
    Extended {
        /// Persisted rows followed by the delta rows
        panel: FactorPanel,
        /// Number of rows appended
        rows_appended: usize,
    },
}

/// Extends persisted panels with newly fetched records.
#[derive(Debug, Clone, Copy)]
pub struct IncrementalMerger<'a> {
    builder: PanelBuilder<'a>,
}

impl<'a> IncrementalMerger<'a> {
    /// Create a merger against the current calendar and universe.
    pub const fn new(
        calendar: &'a TradingCalendar,
        universe: &'a SecurityUniverse,
        mode: AnchorMode,
    ) -> Self {
        Self {
            builder: PanelBuilder::new(calendar, universe, mode),
        }
    }

    /// Anchoring mode.
    pub const fn mode(&self) -> AnchorMode {
        self.builder.mode()
    }

    /// Work out which dates `persisted` is missing.
    ///
    /// Fails with `CalendarMismatch` when the persisted dates are not a prefix
    /// of the calendar.
    pub fn plan(&self, persisted: &FactorPanel) -> Result<DeltaPlan<'a>> {
        let calendar = self.builder.calendar();
        calendar.check_prefix(persisted.dates())?;

        let last_known = persisted.last_date();
        let new_dates = match last_known {
            Some(last) => calendar.after(last),
            None => calendar.dates(),
        };

        if new_dates.is_empty() {
            return Ok(DeltaPlan::AlreadyUpToDate);
        }
        Ok(DeltaPlan::Extend {
            last_known,
            new_dates,
        })
    }

    /// Append rows for every new calendar date to `persisted`.
    ///
    /// `records` may include anything fetched from the plan's lower bound;
    /// records anchored on or before the last persisted date are already
    /// reflected in the persisted last row and are ignored.
    pub fn merge(&self, persisted: FactorPanel, records: Vec<SparseRecord>) -> Result<MergeOutcome> {
        let DeltaPlan::Extend {
            last_known,
            new_dates,
        } = self.plan(&persisted)?
        else {
            return Ok(MergeOutcome::AlreadyUpToDate);
        };

        let universe = self.builder.universe();
        let mut base = if persisted.matches_universe(universe) {
            persisted
        } else {
            warn!(
                persisted = persisted.n_cols(),
                current = universe.len(),
                "universe changed since panel was persisted, re-indexing"
            );
            persisted.reindex_columns(universe)
        };

        let records = match last_known {
            Some(last) => self.retain_after(records, last)?,
            None => records,
        };
        debug!(
            new_dates = new_dates.len(),
            records = records.len(),
            "building delta"
        );

        let seed = base.last_row().map(<[_]>::to_vec);
        let delta = self
            .builder
            .build_window(new_dates, records, seed.as_deref())?;
        let rows_appended = delta.n_rows();
        base.append(delta)?;

        Ok(MergeOutcome::Extended {
            panel: base,
            rows_appended,
        })
    }

    /// [`merge`](Self::merge) for one season of a period-anchored source.
    pub fn merge_season(
        &self,
        season: Season,
        persisted: FactorPanel,
        records: Vec<SparseRecord>,
    ) -> Result<MergeOutcome> {
        let records = split_by_season(records)?
            .remove(&season)
            .unwrap_or_default();
        self.merge(persisted, records)
    }

    fn retain_after(&self, records: Vec<SparseRecord>, last: DateKey) -> Result<Vec<SparseRecord>> {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if let Some(anchor) = self.builder.anchor(&record)?
                && anchor > last
            {
                kept.push(record);
            }
        }
        Ok(kept)
    }
}
