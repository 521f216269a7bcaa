//! Source and panel database locations.
//!
//! Both databases default to a platform-specific cache directory and can be
//! moved with an environment variable or a command-line flag, the flag
//! taking precedence.

use densify_data::{Result, SourceDb, SqlitePanelStore};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the source database path.
pub(crate) const SOURCE_DB_ENV: &str = "DENSIFY_SOURCE_DB";

/// Environment variable overriding the panel database path.
pub(crate) const STORE_DB_ENV: &str = "DENSIFY_STORE_DB";

/// Get the default data directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/densify/`
/// - macOS: `~/Library/Caches/densify/`
/// - Windows: `%LOCALAPPDATA%\densify\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("densify")
}

/// Pick the flag, then the environment value, then `default_name` in the data dir.
fn resolve(flag: Option<PathBuf>, env_value: Option<String>, default_name: &str) -> PathBuf {
    flag.or_else(|| env_value.filter(|v| !v.trim().is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| default_data_dir().join(default_name))
}

/// Resolved source database path.
pub(crate) fn source_path(flag: Option<PathBuf>) -> PathBuf {
    resolve(flag, env::var(SOURCE_DB_ENV).ok(), "source.db")
}

/// Resolved panel database path.
pub(crate) fn store_path(flag: Option<PathBuf>) -> PathBuf {
    resolve(flag, env::var(STORE_DB_ENV).ok(), "panels.db")
}

/// Open the source database read-only.
pub(crate) fn open_source(path: &Path, page_size: Option<usize>) -> Result<SourceDb> {
    let db = SourceDb::open(path)?;
    Ok(match page_size {
        Some(size) => db.with_page_size(size),
        None => db,
    })
}

/// Open the panel store, creating the directory if needed.
pub(crate) fn open_store(path: &Path) -> Result<SqlitePanelStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    SqlitePanelStore::new(path)
}
