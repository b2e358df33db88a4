use crate::bbox::BoundingBox2D;
use serde::{Deserialize, Serialize};

/// Identifier of a row in the indexed table.
pub type RowId = i64;

/// A leaf payload of the R-tree: the approximate bounds of one row's key
/// geometry together with that row's id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub bbox: BoundingBox2D,
    pub row_id: RowId,
}

impl Entry {
    pub fn new(bbox: BoundingBox2D, row_id: RowId) -> Self {
        Self { bbox, row_id }
    }
}
