//! Security universe: the fixed, ordered column index of every panel.

use std::collections::HashMap;

/// Ordered, deduplicated set of security identifiers.
#[derive(Debug, Clone, Default)]
pub struct SecurityUniverse {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
}

impl SecurityUniverse {
    /// Build a universe. Duplicates are dropped; the first occurrence keeps its slot.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut universe = Self::default();
        for id in ids {
            let id = id.into();
            if !universe.positions.contains_key(&id) {
                universe.positions.insert(id.clone(), universe.ids.len());
                universe.ids.push(id);
            }
        }
        universe
    }

    /// Identifiers in column order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Column position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Number of securities.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the universe is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl PartialEq for SecurityUniverse {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for SecurityUniverse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_keeps_first_occurrence() {
        let universe = SecurityUniverse::new(["600373.SH", "000416.SZ", "600373.SH", "300557.SZ"]);
        assert_eq!(universe.len(), 3);
        assert_eq!(universe.ids(), &["600373.SH", "000416.SZ", "300557.SZ"]);
        assert_eq!(universe.position("300557.SZ"), Some(2));
        assert!(universe.contains("000416.SZ"));
        assert!(!universe.contains("NOTREAL"));
    }

    #[test]
    fn test_equality_is_by_order() {
        let a = SecurityUniverse::new(["A", "B"]);
        let b = SecurityUniverse::new(["B", "A"]);
        assert_ne!(a, b);
        assert_eq!(a, SecurityUniverse::new(["A", "B", "A"]));
    }
}
