//! In-memory panel store.

use super::PanelStore;
use crate::error::{DataError, Result};
use densify_panel::{FactorPanel, PanelSet};

/// Panels held in a map, with a count of writes.
#[derive(Debug, Default)]
pub struct MemoryPanelStore {
    panels: PanelSet,
    writes: usize,
}

impl MemoryPanelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed.
    pub const fn write_count(&self) -> usize {
        self.writes
    }

    /// All stored panels.
    pub const fn panels(&self) -> &PanelSet {
        &self.panels
    }
}

impl PanelStore for MemoryPanelStore {
    fn write(&mut self, key: &str, panel: &FactorPanel) -> Result<()> {
        self.panels.insert(key.to_string(), panel.clone());
        self.writes += 1;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<FactorPanel> {
        self.panels
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::StoreMissing {
                key: key.to_string(),
            })
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.panels.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.panels.keys().cloned().collect())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.panels.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use densify_panel::DateKey;

    #[test]
    fn test_round_trip_and_missing() {
        let mut store = MemoryPanelStore::new();
        let panel = FactorPanel::empty(
            vec![DateKey::parse("20160104").unwrap()],
            vec!["A".to_string()],
        );
        store.write("S_HOLDER_NUM", &panel).unwrap();

        assert_eq!(store.read("S_HOLDER_NUM").unwrap(), panel);
        assert!(store.contains("S_HOLDER_NUM").unwrap());
        assert_eq!(store.write_count(), 1);
        assert!(matches!(
            store.read("FLOAT_A_SHR"),
            Err(DataError::StoreMissing { .. })
        ));
        assert!(store.remove("S_HOLDER_NUM").unwrap());
        assert!(store.keys().unwrap().is_empty());
    }
}
