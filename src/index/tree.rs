//! Arena-resident, immutable R-tree.
//!
//! All nodes live in one contiguous `Vec<Node>` and all leaf payloads in one
//! `Vec<Entry>`; nodes refer to their children by index range, never by
//! pointer. The bulk loader appends levels bottom-up, so the children of any
//! node are contiguous: a leaf's children are a run of entries, an internal
//! node's children are a run of nodes on the level below. The root is the
//! last node.
//!
//! A built tree is never mutated. Share it with `Arc` for concurrent search.

use crate::config::Config;
use crate::error::{GeoscanError, Result};
use crate::types::{BoundingBox2D, Entry};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Index of a node in the arena.
pub type NodeId = u32;

/// Contiguous run of children: entries for a leaf, nodes otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRange {
    pub start: u32,
    pub len: u32,
}

impl ChildRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self {
            start: start as u32,
            len: len as u32,
        }
    }

    pub fn as_range(&self) -> Range<usize> {
        let start = self.start as usize;
        start..start + self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Exact union of the children's boxes
    pub bbox: BoundingBox2D,
    pub children: ChildRange,
    pub is_leaf: bool,
    /// Number of entries in this subtree
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) root: NodeId,
    pub(crate) height: u32,
    pub(crate) fanout: usize,
}

impl RTree {
    /// A tree with a single empty leaf as root. Every search returns nothing.
    pub fn empty(fanout: usize) -> Self {
        Self {
            nodes: vec![Node {
                bbox: BoundingBox2D::empty(),
                children: ChildRange::new(0, 0),
                is_leaf: true,
                count: 0,
            }],
            entries: Vec::new(),
            root: 0,
            height: 1,
            fanout,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root as usize]
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Number of node levels; a tree whose root is a leaf has height 1.
    ///
    /// For `n >= 2` entries this is `ceil(log_fanout(n))`.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of everything in the tree.
    pub fn bounds(&self) -> BoundingBox2D {
        self.root_node().bbox
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Children of an internal node, or an empty slice for a leaf.
    pub fn child_nodes(&self, node: &Node) -> &[Node] {
        if node.is_leaf {
            &[]
        } else {
            &self.nodes[node.children.as_range()]
        }
    }

    /// Entries of a leaf, or an empty slice for an internal node.
    pub fn leaf_entries(&self, node: &Node) -> &[Entry] {
        if node.is_leaf {
            &self.entries[node.children.as_range()]
        } else {
            &[]
        }
    }

    /// Leaves in left-to-right order, each as the row ids it holds.
    pub fn leaf_groups(&self) -> Vec<Vec<i64>> {
        self.nodes
            .iter()
            .filter(|node| node.is_leaf)
            .map(|leaf| {
                self.leaf_entries(leaf)
                    .iter()
                    .map(|entry| entry.row_id)
                    .collect()
            })
            .filter(|group: &Vec<i64>| !group.is_empty())
            .collect()
    }

    /// Check the structural invariants of the tree:
    ///
    /// - every node's bbox is exactly the union of its children's boxes,
    /// - every node's entry count is the sum over its children,
    /// - no node has more than `fanout` children,
    /// - all leaves sit at the same depth, `height - 1`,
    /// - children are stored before their parent,
    /// - every entry and node is reachable exactly once.
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() || self.root as usize >= self.nodes.len() {
            return Err(GeoscanError::Internal("R-tree has no root node".to_string()));
        }
        if self.is_empty() {
            let root = self.root_node();
            if !root.is_leaf || !root.children.is_empty() || self.nodes.len() != 1 {
                return Err(GeoscanError::Internal(
                    "Empty R-tree must consist of a single empty leaf".to_string(),
                ));
            }
            return Ok(());
        }
        if !(Config::MIN_FANOUT..=Config::MAX_FANOUT).contains(&self.fanout) {
            return Err(GeoscanError::Internal(format!(
                "R-tree fanout {} out of range",
                self.fanout
            )));
        }
        // A binary tree over u32::MAX entries has 33 levels.
        if self.height == 0 || self.height > u32::BITS + 1 {
            return Err(GeoscanError::Internal(format!(
                "R-tree height {} out of range",
                self.height
            )));
        }

        let mut visited_nodes = vec![false; self.nodes.len()];
        let mut visited_entries = vec![false; self.entries.len()];
        self.validate_node(self.root, 0, &mut visited_nodes, &mut visited_entries)?;

        let reached_nodes = visited_nodes.iter().filter(|&&seen| seen).count();
        if reached_nodes != self.nodes.len() {
            return Err(GeoscanError::Internal(format!(
                "{} of {} nodes reachable from the root",
                reached_nodes,
                self.nodes.len()
            )));
        }
        let reached_entries = visited_entries.iter().filter(|&&seen| seen).count();
        if reached_entries != self.entries.len() {
            return Err(GeoscanError::Internal(format!(
                "{} of {} entries reachable from the root",
                reached_entries,
                self.entries.len()
            )));
        }
        Ok(())
    }

    fn validate_node(
        &self,
        id: NodeId,
        depth: u32,
        visited_nodes: &mut [bool],
        visited_entries: &mut [bool],
    ) -> Result<()> {
        let node = self.node(id).ok_or_else(|| {
            GeoscanError::Internal(format!("Node {} out of bounds", id))
        })?;
        let seen = &mut visited_nodes[id as usize];
        if *seen {
            return Err(GeoscanError::Internal(format!("Node {} reached twice", id)));
        }
        *seen = true;

        let range = node.children.as_range();
        if range.is_empty() {
            return Err(GeoscanError::Internal(format!("Node {} has no children", id)));
        }
        if range.len() > self.fanout {
            return Err(GeoscanError::Internal(format!(
                "Node {} has {} children, fanout is {}",
                id,
                range.len(),
                self.fanout
            )));
        }

        let (union, count) = if node.is_leaf {
            if depth + 1 != self.height {
                return Err(GeoscanError::Internal(format!(
                    "Leaf {} at depth {}, expected {}",
                    id,
                    depth,
                    self.height.saturating_sub(1)
                )));
            }
            let entries = self.entries.get(range.clone()).ok_or_else(|| {
                GeoscanError::Internal(format!("Leaf {} entry range out of bounds", id))
            })?;
            for (offset, seen) in visited_entries
                .get_mut(range.clone())
                .into_iter()
                .flatten()
                .enumerate()
            {
                if *seen {
                    return Err(GeoscanError::Internal(format!(
                        "Entry {} reached twice, again from leaf {}",
                        range.start + offset,
                        id
                    )));
                }
                *seen = true;
            }
            (
                BoundingBox2D::union_all(entries.iter().map(|entry| &entry.bbox)),
                entries.len() as u64,
            )
        } else {
            if depth + 1 >= self.height {
                return Err(GeoscanError::Internal(format!(
                    "Internal node {} at depth {}, leaves expected at {}",
                    id,
                    depth,
                    self.height.saturating_sub(1)
                )));
            }
            // Levels are appended bottom-up, so children precede their parent.
            if range.end > id as usize {
                return Err(GeoscanError::Internal(format!(
                    "Node {} child range {:?} does not precede it",
                    id, range
                )));
            }
            let children = self.nodes.get(range.clone()).ok_or_else(|| {
                GeoscanError::Internal(format!("Node {} child range out of bounds", id))
            })?;
            for child in range.clone() {
                self.validate_node(child as NodeId, depth + 1, visited_nodes, visited_entries)?;
            }
            (
                BoundingBox2D::union_all(children.iter().map(|child| &child.bbox)),
                children.iter().map(|child| child.count).sum(),
            )
        };

        if union != node.bbox {
            return Err(GeoscanError::Internal(format!(
                "Node {} bbox {} differs from union of children {}",
                id, node.bbox, union
            )));
        }
        if count != node.count {
            return Err(GeoscanError::Internal(format!(
                "Node {} count {} differs from children total {}",
                id, node.count, count
            )));
        }
        Ok(())
    }
}
