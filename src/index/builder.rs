//! Packed bottom-up bulk loader.
//!
//! Entries are sorted, cut into consecutive groups of at most `fanout`
//! entries (one leaf per group), and the resulting node sequence is grouped
//! the same way, level by level, until a single root remains.
//!
//! Leaf packing can be split across worker threads. Partitions are aligned
//! to multiples of `fanout` and concatenated in partition order, so the
//! parallel result is identical to the single-threaded one.

use super::sort::sort_entries;
use super::tree::{ChildRange, Node, NodeId, RTree};
use crate::config::{Config, SortKey};
use crate::error::{GeoscanError, Result};
use crate::types::{BoundingBox2D, Entry};
use std::thread;

/// Builder for an immutable [`RTree`].
///
/// # Example
///
/// ```rust
/// use geoscan::index::RTreeBuilder;
/// use geoscan::types::{BoundingBox2D, Entry};
///
/// let mut builder = RTreeBuilder::new(4);
/// for i in 0..10 {
///     builder.push(Entry::new(BoundingBox2D::point(i as f32, 0.0), i));
/// }
/// let tree = builder.build().unwrap();
/// assert_eq!(tree.len(), 10);
/// assert_eq!(tree.height(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RTreeBuilder {
    fanout: usize,
    threads: usize,
    parallel_threshold: usize,
    sort_key: SortKey,
    entries: Vec<Entry>,
}

impl RTreeBuilder {
    /// Single-threaded builder with the given fanout and the default sort key.
    pub fn new(fanout: usize) -> Self {
        Self {
            fanout,
            threads: 1,
            parallel_threshold: usize::MAX,
            sort_key: SortKey::default(),
            entries: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            fanout: config.fanout,
            threads: config.build_threads,
            parallel_threshold: config.parallel_build_threshold,
            sort_key: config.sort_key,
            entries: Vec::new(),
        }
    }

    pub fn with_threads(mut self, threads: usize, parallel_threshold: usize) -> Self {
        self.threads = threads.max(1);
        self.parallel_threshold = parallel_threshold;
        self
    }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.entries.reserve(capacity);
        self
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort the collected entries, then pack them.
    pub fn build(mut self) -> Result<RTree> {
        sort_entries(&mut self.entries, self.sort_key);
        self.build_sorted()
    }

    /// Pack the collected entries in the order they were pushed.
    ///
    /// Use this when the input stream is already sorted.
    pub fn build_sorted(self) -> Result<RTree> {
        if !(Config::MIN_FANOUT..=Config::MAX_FANOUT).contains(&self.fanout) {
            return Err(GeoscanError::InvalidInput(format!(
                "Fanout must be between {} and {}, got: {}",
                Config::MIN_FANOUT,
                Config::MAX_FANOUT,
                self.fanout
            )));
        }
        if self.entries.len() > u32::MAX as usize {
            return Err(GeoscanError::InvalidInput(format!(
                "Cannot index {} entries, the limit is {}",
                self.entries.len(),
                u32::MAX
            )));
        }
        if let Some(bad) = self.entries.iter().find(|entry| !entry.bbox.is_valid()) {
            return Err(GeoscanError::InvalidInput(format!(
                "Entry for row {} has invalid bounding box {}",
                bad.row_id, bad.bbox
            )));
        }

        if self.entries.is_empty() {
            log::debug!("Built empty R-tree");
            return Ok(RTree::empty(self.fanout));
        }

        let mut nodes = self.pack_leaves()?;
        let leaf_count = nodes.len();

        let mut height = 1;
        let mut level_start = 0;
        let mut level_len = nodes.len();
        while level_len > 1 {
            let next_start = nodes.len();
            let mut offset = level_start;
            while offset < level_start + level_len {
                let len = self.fanout.min(level_start + level_len - offset);
                let children = &nodes[offset..offset + len];
                let parent = Node {
                    bbox: BoundingBox2D::union_all(children.iter().map(|child| &child.bbox)),
                    children: ChildRange::new(offset, len),
                    is_leaf: false,
                    count: children.iter().map(|child| child.count).sum(),
                };
                nodes.push(parent);
                offset += len;
            }
            level_start = next_start;
            level_len = nodes.len() - next_start;
            height += 1;
        }

        let root = (nodes.len() - 1) as NodeId;
        log::debug!(
            "Built R-tree: {} entries, {} leaves, {} nodes, height {}",
            self.entries.len(),
            leaf_count,
            nodes.len(),
            height
        );

        Ok(RTree {
            nodes,
            entries: self.entries,
            root,
            height,
            fanout: self.fanout,
        })
    }

    fn pack_leaves(&self) -> Result<Vec<Node>> {
        let n = self.entries.len();
        if self.threads <= 1 || n < self.parallel_threshold {
            return Ok(pack_leaf_range(&self.entries, 0, self.fanout));
        }

        let leaves = n.div_ceil(self.fanout);
        let partition = leaves.div_ceil(self.threads) * self.fanout;
        log::debug!(
            "Packing {} leaves on {} threads, {} entries per partition",
            leaves,
            self.threads,
            partition
        );

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .entries
                .chunks(partition)
                .enumerate()
                .map(|(i, chunk)| {
                    let fanout = self.fanout;
                    scope.spawn(move || pack_leaf_range(chunk, i * partition, fanout))
                })
                .collect();

            let mut nodes = Vec::with_capacity(leaves);
            for handle in handles {
                let packed = handle.join().map_err(|_| {
                    GeoscanError::Internal("Leaf packing worker panicked".to_string())
                })?;
                nodes.extend(packed);
            }
            Ok(nodes)
        })
    }
}

/// Pack `entries` into leaves of at most `fanout` entries. `base` is the
/// position of `entries[0]` in the full entry array.
fn pack_leaf_range(entries: &[Entry], base: usize, fanout: usize) -> Vec<Node> {
    entries
        .chunks(fanout)
        .enumerate()
        .map(|(i, group)| Node {
            bbox: BoundingBox2D::union_all(group.iter().map(|entry| &entry.bbox)),
            children: ChildRange::new(base + i * fanout, group.len()),
            is_leaf: true,
            count: group.len() as u64,
        })
        .collect()
}

/// Build a tree from `entries` with the settings in `config`.
pub fn bulk_load(entries: Vec<Entry>, config: &Config) -> Result<RTree> {
    let mut builder = RTreeBuilder::from_config(config).with_capacity(entries.len());
    for entry in entries {
        builder.push(entry);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Entry> {
        (0..n)
            .map(|i| {
                let x = ((i * 7919) % 1000) as f32;
                let y = ((i * 104_729) % 1000) as f32;
                Entry::new(BoundingBox2D::new(x, y, x + 1.5, y + 0.5), i as i64)
            })
            .collect()
    }

    #[test]
    fn test_single_entry() {
        let mut builder = RTreeBuilder::new(8);
        builder.push(Entry::new(BoundingBox2D::new(1.0, 2.0, 3.0, 4.0), 42));
        let tree = builder.build().unwrap();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.root_node().is_leaf);
        assert_eq!(tree.bounds(), BoundingBox2D::new(1.0, 2.0, 3.0, 4.0));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_exact_fanout_fills_one_leaf() {
        let mut builder = RTreeBuilder::new(4);
        for entry in points(4) {
            builder.push(entry);
        }
        let tree = builder.build().unwrap();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root_node().count, 4);
    }

    #[test]
    fn test_height_matches_log_fanout() {
        for (n, fanout, expected) in [(5, 2, 3), (16, 4, 2), (17, 4, 3), (1000, 10, 3), (1001, 10, 4)] {
            let config = Config::default().with_fanout(fanout);
            let tree = bulk_load(points(n), &config).unwrap();
            assert_eq!(tree.height(), expected, "n={} fanout={}", n, fanout);
            assert!(tree.validate().is_ok());
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = bulk_load(points(5000), &Config::default().with_fanout(16)).unwrap();
        for threads in [2, 3, 7] {
            let config = Config::default()
                .with_fanout(16)
                .with_build_threads(threads)
                .with_parallel_build_threshold(0);
            let parallel = bulk_load(points(5000), &config).unwrap();
            assert_eq!(parallel, sequential, "threads={}", threads);
        }
    }

    #[test]
    fn test_rejects_invalid_entry() {
        let mut builder = RTreeBuilder::new(4);
        builder.push(Entry::new(BoundingBox2D::new(2.0, 0.0, 1.0, 1.0), 9));
        assert!(matches!(builder.build(), Err(GeoscanError::InvalidInput(_))));

        let mut builder = RTreeBuilder::new(4);
        builder.push(Entry::new(BoundingBox2D::new(f32::NAN, 0.0, 1.0, 1.0), 9));
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_rejects_bad_fanout() {
        assert!(RTreeBuilder::new(1).build().is_err());
        assert!(RTreeBuilder::new(4096).build().is_err());
    }
}
