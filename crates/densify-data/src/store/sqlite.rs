//! SQLite panel store.
//!
//! Each panel is a header row in `panels` (columns as a JSON array, row count,
//! last write time) plus one `panel_rows` row per date holding the cells as a
//! JSON array. A write replaces both inside one transaction.

use super::PanelStore;
use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use densify_panel::{DateKey, FactorPanel, Value};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

/// SQLite-backed [`PanelStore`].
#[derive(Debug)]
pub struct SqlitePanelStore {
    conn: Connection,
}

impl SqlitePanelStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS panels (
                key TEXT PRIMARY KEY,
                columns TEXT NOT NULL,
                n_rows INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS panel_rows (
                key TEXT NOT NULL,
                row_idx INTEGER NOT NULL,
                date TEXT NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY (key, row_idx)
            )",
            [],
        )?;

        Ok(())
    }

    /// When the panel under `key` was last written.
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM panels WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DataError::Schema(format!("bad timestamp {s:?}: {e}")))
        })
        .transpose()
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let panels: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM panels", [], |row| row.get(0))?;

        let rows: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM panel_rows", [], |row| row.get(0))?;

        Ok(StoreStats {
            panels: panels as usize,
            rows: rows as usize,
        })
    }
}

impl PanelStore for SqlitePanelStore {
    fn write(&mut self, key: &str, panel: &FactorPanel) -> Result<()> {
        let columns = serde_json::to_string(panel.columns())?;
        let updated_at = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM panel_rows WHERE key = ?1", params![key])?;
        tx.execute(
            "INSERT OR REPLACE INTO panels (key, columns, n_rows, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, columns, panel.n_rows() as i64, updated_at],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO panel_rows (key, row_idx, date, cells) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (idx, (date, row)) in panel.rows().enumerate() {
                stmt.execute(params![
                    key,
                    idx as i64,
                    date.to_string(),
                    serde_json::to_string(row)?
                ])?;
            }
        }
        tx.commit()?;

        debug!(key, rows = panel.n_rows(), cols = panel.n_cols(), "wrote panel");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<FactorPanel> {
        let header: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT columns, n_rows FROM panels WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((columns, n_rows)) = header else {
            return Err(DataError::StoreMissing {
                key: key.to_string(),
            });
        };
        let columns: Vec<String> = serde_json::from_str(&columns)?;
        let n_rows = n_rows as usize;

        let mut stmt = self
            .conn
            .prepare("SELECT date, cells FROM panel_rows WHERE key = ?1 ORDER BY row_idx")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut dates = Vec::with_capacity(n_rows);
        let mut cells = Vec::with_capacity(n_rows);
        for row in rows {
            let (date, json) = row?;
            dates.push(DateKey::parse(&date)?);
            cells.push(serde_json::from_str::<Vec<Option<Value>>>(&json)?);
        }

        if dates.len() != n_rows {
            return Err(DataError::Schema(format!(
                "panel {key} has {} rows, header says {n_rows}",
                dates.len()
            )));
        }

        Ok(FactorPanel::from_rows(dates, columns, cells)?)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM panels WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM panels ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM panel_rows WHERE key = ?1", params![key])?;
        let removed = tx.execute("DELETE FROM panels WHERE key = ?1", params![key])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Number of stored panels
    pub panels: usize,
    /// Total number of stored rows across panels
    pub rows: usize,
}
