use super::tree::RTree;
use serde::Serialize;
use std::fmt;

/// Shape summary of a built tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RTreeStats {
    pub entries: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub height: u32,
    pub fanout: usize,
}

impl RTreeStats {
    /// Average number of entries per leaf.
    pub fn leaf_fill(&self) -> f64 {
        if self.leaves == 0 {
            0.0
        } else {
            self.entries as f64 / self.leaves as f64
        }
    }
}

impl fmt::Display for RTreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} nodes={} leaves={} height={} fanout={}",
            self.entries, self.nodes, self.leaves, self.height, self.fanout
        )
    }
}

impl RTree {
    pub fn stats(&self) -> RTreeStats {
        RTreeStats {
            entries: self.len(),
            nodes: self.node_count(),
            leaves: self
                .nodes
                .iter()
                .filter(|node| node.is_leaf && !node.children.is_empty())
                .count(),
            height: self.height(),
            fanout: self.fanout(),
        }
    }
}
