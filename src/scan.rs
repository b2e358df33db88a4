//! R-tree index scan operator.
//!
//! The planner binds an [`IndexScanBindData`] into a table scan; at
//! execution time [`IndexScan`] searches the tree for candidate row ids and
//! fetches the corresponding rows from table storage in batches. Candidates
//! only satisfy the bounding box test, so the plan keeps the exact predicate
//! in a filter above the scan.

use crate::catalog::TableEntry;
use crate::error::{GeoscanError, Result};
use crate::index::RTreeIndex;
use crate::types::{BoundingBox2D, RowId, Value};
use std::fmt;
use std::sync::Arc;

/// Plan-time binding of an index scan. Scoped to a single query.
#[derive(Clone)]
pub struct IndexScanBindData {
    pub table: Arc<TableEntry>,
    pub index: Arc<RTreeIndex>,
    pub bbox: BoundingBox2D,
}

impl IndexScanBindData {
    pub fn new(table: Arc<TableEntry>, index: Arc<RTreeIndex>, bbox: BoundingBox2D) -> Self {
        Self { table, index, bbox }
    }
}

impl PartialEq for IndexScanBindData {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
            && Arc::ptr_eq(&self.index, &other.index)
            && self.bbox == other.bbox
    }
}

impl fmt::Debug for IndexScanBindData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexScanBindData")
            .field("table", &self.table.name())
            .field("index", &self.index.name())
            .field("bbox", &self.bbox)
            .finish()
    }
}

/// Cost model and entry points of the index scan table function.
pub struct RTreeIndexScan;

impl RTreeIndexScan {
    pub const NAME: &'static str = "rtree_index_scan";

    /// Estimated number of rows the scan produces: the entry counts of the
    /// root's children that intersect the query box, capped by the table's
    /// cardinality.
    pub fn cardinality(bind: &IndexScanBindData) -> u64 {
        bind.index
            .estimate(&bind.bbox)
            .min(bind.table.cardinality())
    }

    /// Start executing `bind`, producing rows projected to `column_ids`.
    pub fn init(
        bind: &IndexScanBindData,
        column_ids: &[usize],
        batch_size: usize,
    ) -> Result<IndexScan> {
        IndexScan::new(bind, column_ids, batch_size)
    }
}

/// Execution state of one index scan.
pub struct IndexScan {
    table: Arc<TableEntry>,
    column_ids: Vec<usize>,
    row_ids: Vec<RowId>,
    position: usize,
    batch_size: usize,
}

impl IndexScan {
    /// Search the index and prepare to fetch candidates.
    ///
    /// Fails with [`GeoscanError::Internal`] when the bound index is no
    /// longer attached to its table.
    pub fn new(bind: &IndexScanBindData, column_ids: &[usize], batch_size: usize) -> Result<Self> {
        let attached = bind
            .table
            .index(bind.index.name())
            .is_some_and(|index| Arc::ptr_eq(&index, &bind.index));
        if !attached {
            return Err(GeoscanError::Internal(format!(
                "Index {} is not attached to table {} at scan time",
                bind.index.name(),
                bind.table.name()
            )));
        }

        let row_ids: Vec<RowId> = bind.index.search(&bind.bbox).collect();
        log::trace!(
            "Index scan on {} with {}: {} candidates",
            bind.index.name(),
            bind.bbox,
            row_ids.len()
        );

        Ok(Self {
            table: Arc::clone(&bind.table),
            column_ids: column_ids.to_vec(),
            row_ids,
            position: 0,
            batch_size: batch_size.max(1),
        })
    }

    /// Candidates not yet fetched.
    pub fn remaining(&self) -> usize {
        self.row_ids.len() - self.position
    }

    /// Fetch the next batch of at most `batch_size` candidate rows, or
    /// `None` once every candidate has been fetched.
    pub fn next_batch(&mut self) -> Result<Option<Vec<(RowId, Vec<Value>)>>> {
        if self.position >= self.row_ids.len() {
            return Ok(None);
        }
        let end = (self.position + self.batch_size).min(self.row_ids.len());
        let batch = self
            .table
            .storage()
            .fetch(&self.row_ids[self.position..end], &self.column_ids)?;
        self.position = end;
        Ok(Some(batch))
    }

    /// Fetch every remaining candidate.
    pub fn collect_rows(mut self) -> Result<Vec<(RowId, Vec<Value>)>> {
        let mut rows = Vec::with_capacity(self.remaining());
        while let Some(batch) = self.next_batch()? {
            rows.extend(batch);
        }
        Ok(rows)
    }
}
