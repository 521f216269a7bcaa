//! Per-season panels for period-anchored sources.

use super::PanelBuilder;
use crate::cell::Value;
use crate::calendar::DateKey;
use crate::error::{PanelError, Result};
use crate::panel::FactorPanel;
use crate::record::{Season, SparseRecord};
use std::collections::BTreeMap;

/// Partition records by fiscal season.
///
/// Every season is present in the result, possibly with no records, so that a
/// rebuild always produces all four season panels.
pub fn split_by_season(records: Vec<SparseRecord>) -> Result<BTreeMap<Season, Vec<SparseRecord>>> {
    let mut seasons: BTreeMap<Season, Vec<SparseRecord>> =
        Season::ALL.iter().map(|s| (*s, Vec::new())).collect();

    for record in records {
        let period = record
            .report_period
            .ok_or_else(|| PanelError::MissingReportPeriod {
                entity_id: record.entity_id.clone(),
            })?;
        seasons.entry(period.season).or_default().push(record);
    }

    Ok(seasons)
}

impl PanelBuilder<'_> {
    /// Build one panel per fiscal season over the whole calendar.
    pub fn build_by_season(
        &self,
        records: Vec<SparseRecord>,
    ) -> Result<BTreeMap<Season, FactorPanel>> {
        split_by_season(records)?
            .into_iter()
            .map(|(season, records)| Ok((season, self.build(records)?)))
            .collect()
    }

    /// Build one season panel over `window`, continuing from `seed`.
    pub fn build_season_window(
        &self,
        season: Season,
        window: &[DateKey],
        records: Vec<SparseRecord>,
        seed: Option<&[Option<Value>]>,
    ) -> Result<FactorPanel> {
        let records = split_by_season(records)?
            .remove(&season)
            .unwrap_or_default();
        self.build_window(window, records, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AnchorMode;
    use crate::calendar::TradingCalendar;
    use crate::record::ReportPeriod;
    use crate::universe::SecurityUniverse;

    fn key(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    fn report(entity: &str, period: &str, v: f64) -> SparseRecord {
        let period = ReportPeriod::parse(period).unwrap();
        SparseRecord::periodic(entity, key(&period.to_string()), period, Value::Number(v))
    }

    #[test]
    fn test_split_by_season_keeps_all_seasons() {
        let seasons = split_by_season(vec![report("A", "20161231", 1.0)]).unwrap();
        assert_eq!(seasons.len(), 4);
        assert_eq!(seasons[&Season::Q4].len(), 1);
        assert!(seasons[&Season::Q1].is_empty());
    }

    #[test]
    fn test_split_requires_period() {
        let record = SparseRecord::new("A", key("20160104"), Value::Number(1.0));
        assert!(split_by_season(vec![record]).is_err());
    }

    #[test]
    fn test_period_example() {
        // Q4 of 2016 and 2017 for one entity, calendar spanning both years.
        let calendar = TradingCalendar::parse([
            "20161229", "20161230", "20170103", "20170104", "20180102",
        ])
        .unwrap();
        let universe = SecurityUniverse::new(["A"]);
        let builder = PanelBuilder::new(&calendar, &universe, AnchorMode::PeriodStart);

        let panels = builder
            .build_by_season(vec![
                report("A", "20161231", 0.12),
                report("A", "20171231", 0.15),
            ])
            .unwrap();

        let q4 = &panels[&Season::Q4];
        let column: Vec<Option<f64>> = (0..q4.n_rows())
            .map(|r| q4.get(r, 0).and_then(Value::as_f64))
            .collect();
        // The 2016 report anchors before the calendar starts (first date on or
        // after 2016-01-01 is 2016-12-29), the 2017 one on 2017-01-03.
        assert_eq!(
            column,
            vec![Some(0.12), Some(0.12), Some(0.15), Some(0.15), Some(0.15)]
        );
        assert!((0..panels[&Season::Q1].n_rows()).all(|r| panels[&Season::Q1].get(r, 0).is_none()));
    }

    #[test]
    fn test_season_window_filters_other_seasons() {
        let calendar = TradingCalendar::parse(["20170103", "20170104"]).unwrap();
        let universe = SecurityUniverse::new(["A"]);
        let builder = PanelBuilder::new(&calendar, &universe, AnchorMode::PeriodStart);
        let panel = builder
            .build_season_window(
                Season::Q1,
                calendar.dates(),
                vec![report("A", "20171231", 1.0), report("A", "20170331", 2.0)],
                None,
            )
            .unwrap();
        assert_eq!(panel.get(0, 0), Some(&Value::Number(2.0)));
    }
}
