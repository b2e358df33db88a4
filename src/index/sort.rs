//! Pre-pack ordering of extracted entries.
//!
//! Entries are ordered by a single scalar derived from their bounding box.
//! The sort is stable: entries with equal keys keep their extraction order,
//! which is what makes rebuilding from the same input deterministic.

use crate::config::SortKey;
use crate::types::Entry;

/// Scalar sort key of `entry` under `key`.
pub fn sort_value(entry: &Entry, key: SortKey) -> f32 {
    match key {
        SortKey::MinX => entry.bbox.min_x,
        SortKey::CenterX => entry.bbox.center().0,
    }
}

/// Sort `entries` ascending by `key`, stably.
pub fn sort_entries(entries: &mut [Entry], key: SortKey) {
    entries.sort_by(|a, b| sort_value(a, key).total_cmp(&sort_value(b, key)));
}

/// Whether `entries` is already in the order [`sort_entries`] produces.
pub fn is_sorted(entries: &[Entry], key: SortKey) -> bool {
    entries
        .windows(2)
        .all(|pair| sort_value(&pair[0], key) <= sort_value(&pair[1], key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox2D;

    fn entry(min_x: f32, max_x: f32, row_id: i64) -> Entry {
        Entry::new(BoundingBox2D::new(min_x, 0.0, max_x, 1.0), row_id)
    }

    #[test]
    fn test_sort_by_min_x_is_stable() {
        let mut entries = vec![
            entry(3.0, 4.0, 0),
            entry(1.0, 9.0, 1),
            entry(3.0, 3.5, 2),
            entry(-2.0, 0.0, 3),
        ];
        sort_entries(&mut entries, SortKey::MinX);
        let ids: Vec<i64> = entries.iter().map(|e| e.row_id).collect();
        assert_eq!(ids, vec![3, 1, 0, 2]);
        assert!(is_sorted(&entries, SortKey::MinX));
    }

    #[test]
    fn test_sort_by_center_x() {
        let mut entries = vec![entry(0.0, 10.0, 0), entry(1.0, 2.0, 1)];
        sort_entries(&mut entries, SortKey::CenterX);
        let ids: Vec<i64> = entries.iter().map(|e| e.row_id).collect();
        assert_eq!(ids, vec![1, 0]);
        assert!(!is_sorted(&entries, SortKey::MinX));
    }
}
