//! Panel export to DataFrames, CSV and JSON.

use crate::error::Result;
use densify_panel::{FactorPanel, Value};
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values, one row per date
    Csv,
    /// JSON object with `dates`, `columns` and `rows`
    Json,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Guess the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

#[derive(Serialize)]
struct PanelJson<'a> {
    dates: Vec<String>,
    columns: &'a [String],
    rows: Vec<&'a [Option<Value>]>,
}

/// Convert a panel to a wide DataFrame: a `date` column then one column per
/// security. A security column is `Float64` unless it holds any text, in
/// which case it is `String`.
pub fn panel_to_dataframe(panel: &FactorPanel) -> Result<DataFrame> {
    let dates: Vec<String> = panel.dates().iter().map(ToString::to_string).collect();
    let mut columns: Vec<Column> = Vec::with_capacity(panel.n_cols() + 1);
    columns.push(Series::new("date".into(), dates).into());

    for (col, name) in panel.columns().iter().enumerate() {
        let cells: Vec<Option<&Value>> = (0..panel.n_rows()).map(|r| panel.get(r, col)).collect();
        let is_text = cells.iter().flatten().any(|v| v.as_str().is_some());

        let series = if is_text {
            let values: Vec<Option<String>> =
                cells.iter().map(|c| c.map(ToString::to_string)).collect();
            Series::new(name.as_str().into(), values)
        } else {
            let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(Value::as_f64)).collect();
            Series::new(name.as_str().into(), values)
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Render a panel in `format`.
pub fn export_to_string(panel: &FactorPanel, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            let header = std::iter::once("date").chain(panel.columns().iter().map(String::as_str));
            wtr.write_record(header)?;
            for (date, row) in panel.rows() {
                let mut record = Vec::with_capacity(row.len() + 1);
                record.push(date.to_string());
                record.extend(
                    row.iter()
                        .map(|c| c.as_ref().map(ToString::to_string).unwrap_or_default()),
                );
                wtr.write_record(&record)?;
            }
            let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        ExportFormat::Json => {
            let json = PanelJson {
                dates: panel.dates().iter().map(ToString::to_string).collect(),
                columns: panel.columns(),
                rows: panel.rows().map(|(_, row)| row).collect(),
            };
            Ok(serde_json::to_string(&json)?)
        }
    }
}

/// Write a panel to `path` in `format`.
pub fn export_to_file(panel: &FactorPanel, path: &Path, format: ExportFormat) -> Result<()> {
    let content = export_to_string(panel, format)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
