//! Pileup row assignment.
//!
//! Overlapping reads stack vertically: each read goes to the lowest display
//! row where it overlaps nothing already placed. The guarantee is
//! correctness, not compactness: no two intervals sharing a row intersect;
//! nothing promises the row count is minimal.

use crate::interval::Interval;

/// Assign `interval` to the lowest row whose occupants it does not
/// intersect, appending it there and growing the row list when every
/// existing row is blocked. Returns the chosen row index.
pub fn add_to_pileup(interval: Interval, rows: &mut Vec<Vec<Interval>>) -> usize {
    for (i, row) in rows.iter_mut().enumerate() {
        if row.iter().all(|occupant| !occupant.intersects(&interval)) {
            row.push(interval);
            return i;
        }
    }
    rows.push(vec![interval]);
    rows.len() - 1
}

/// Row assignments for `intervals`, processed in the given order (never
/// re-sorted): the same ordered input always yields the same rows.
pub fn pileup(intervals: &[Interval]) -> Vec<usize> {
    let mut rows = Vec::new();
    intervals
        .iter()
        .map(|interval| add_to_pileup(*interval, &mut rows))
        .collect()
}
