//! Bounding box range search.
//!
//! Descends from the root into every child whose box intersects the query
//! box and yields the row id of every leaf entry whose box intersects it.
//! Because each node's box is the exact union of its children, no matching
//! entry can be pruned away; callers re-check their exact predicate against
//! the returned candidates.

use super::tree::{NodeId, RTree};
use crate::types::{BoundingBox2D, Entry, RowId};
use smallvec::SmallVec;
use std::slice;

/// Lazy iterator over the row ids of entries intersecting a query box.
///
/// Borrows the tree; any number of searches may run concurrently over the
/// same tree.
pub struct RangeSearch<'a> {
    tree: &'a RTree,
    query: BoundingBox2D,
    stack: SmallVec<[NodeId; 32]>,
    leaf: slice::Iter<'a, Entry>,
}

impl<'a> RangeSearch<'a> {
    fn new(tree: &'a RTree, query: BoundingBox2D) -> Self {
        let mut stack = SmallVec::new();
        if !query.is_valid() {
            log::warn!("Rejecting bounding box query with non-finite or inverted coordinates: {}", query);
        } else if !tree.is_empty() && tree.bounds().intersects(&query) {
            stack.push(tree.root());
        }
        Self {
            tree,
            query,
            stack,
            leaf: [].iter(),
        }
    }

    /// Collect the remaining candidates.
    pub fn into_vec(self) -> Vec<RowId> {
        self.collect()
    }
}

impl Iterator for RangeSearch<'_> {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        loop {
            for entry in self.leaf.by_ref() {
                if entry.bbox.intersects(&self.query) {
                    return Some(entry.row_id);
                }
            }

            let id = self.stack.pop()?;
            let node = self.tree.node(id)?;
            if node.is_leaf {
                self.leaf = self.tree.leaf_entries(node).iter();
                continue;
            }
            // Push in reverse so children are visited left to right.
            let range = node.children.as_range();
            for (child_id, child) in range.clone().zip(self.tree.child_nodes(node)).rev() {
                if child.bbox.intersects(&self.query) {
                    self.stack.push(child_id as NodeId);
                }
            }
        }
    }
}

impl RTree {
    /// Row ids of all entries whose box intersects `query`.
    ///
    /// An empty tree, or a query box that is inverted or not finite, yields
    /// nothing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use geoscan::index::RTreeBuilder;
    /// use geoscan::types::{BoundingBox2D, Entry};
    ///
    /// let mut builder = RTreeBuilder::new(2);
    /// for i in 0..5 {
    ///     builder.push(Entry::new(BoundingBox2D::point(i as f32, i as f32), i));
    /// }
    /// let tree = builder.build().unwrap();
    ///
    /// let hits: Vec<i64> = tree.search(&BoundingBox2D::new(0.5, 0.5, 2.0, 2.0)).collect();
    /// assert_eq!(hits, vec![1, 2]);
    /// ```
    pub fn search(&self, query: &BoundingBox2D) -> RangeSearch<'_> {
        RangeSearch::new(self, *query)
    }

    /// Number of entries whose box intersects `query`.
    pub fn count_intersecting(&self, query: &BoundingBox2D) -> usize {
        self.search(query).count()
    }

    /// Estimated number of matches for `query`: the entry counts of the
    /// root's children whose box intersects it. Exact zero for an empty
    /// tree or an invalid query.
    pub fn estimate(&self, query: &BoundingBox2D) -> u64 {
        if self.is_empty() || !query.is_valid() {
            return 0;
        }
        let root = self.root_node();
        if root.is_leaf {
            return if root.bbox.intersects(query) { root.count } else { 0 };
        }
        self.child_nodes(root)
            .iter()
            .filter(|child| child.bbox.intersects(query))
            .map(|child| child.count)
            .sum()
    }
}
