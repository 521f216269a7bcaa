//! Panel persistence.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryPanelStore;
pub use sqlite::{SqlitePanelStore, StoreStats};

use crate::error::Result;
use densify_panel::FactorPanel;

/// Keyed storage of whole panels.
pub trait PanelStore {
    /// Store `panel` under `key`, replacing whatever was there.
    fn write(&mut self, key: &str, panel: &FactorPanel) -> Result<()>;

    /// Load the panel stored under `key`, or `StoreMissing`.
    fn read(&self, key: &str) -> Result<FactorPanel>;

    /// Whether a panel is stored under `key`.
    fn contains(&self, key: &str) -> Result<bool>;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete the panel under `key`. Returns whether one existed.
    fn remove(&mut self, key: &str) -> Result<bool>;
}
