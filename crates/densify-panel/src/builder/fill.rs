//! Two-pointer forward fill of a single entity.

use crate::calendar::DateKey;
use crate::cell::Cell;

/// Forward-fill one entity's observations over `window`.
///
/// `window` must be ascending and `observations` ascending by anchor key with
/// at most one observation per key. Both cursors only move forward, so the
/// walk is O(|window| + |observations|). Observations anchored before the
/// first window date replace `seed` before the first row is emitted.
pub fn fill_column(window: &[DateKey], observations: &[(DateKey, Cell)], seed: Cell) -> Vec<Cell> {
    let mut filled = Vec::with_capacity(window.len());
    let mut carried = seed;
    let mut cursor = 0;

    for date in window {
        while let Some((key, cell)) = observations.get(cursor) {
            if key > date {
                break;
            }
            carried = cell.clone();
            cursor += 1;
        }
        filled.push(carried.clone());
    }

    filled
}
