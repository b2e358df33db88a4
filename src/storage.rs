//! Table storage abstraction.
//!
//! Table data itself is owned by the surrounding engine; the index only needs
//! to scan rows while building and to fetch rows by id while scanning. This
//! trait is that boundary. [`MemoryStorage`] is a simple in-memory
//! implementation where a row's id is its insertion position.

use crate::error::{GeoscanError, Result};
use crate::types::{RowId, Value};
use parking_lot::RwLock;

/// Trait for table storage implementations
pub trait StorageBackend: Send + Sync {
    /// Number of live rows
    fn cardinality(&self) -> u64;

    /// Visit every row, projected to `column_ids`, in row id order.
    ///
    /// Stops at the first error returned by `visit` and propagates it.
    fn scan(
        &self,
        column_ids: &[usize],
        visit: &mut dyn FnMut(RowId, Vec<Value>) -> Result<()>,
    ) -> Result<()>;

    /// Fetch the rows with the given ids, projected to `column_ids`.
    ///
    /// Ids that do not exist are skipped.
    fn fetch(&self, row_ids: &[RowId], column_ids: &[usize]) -> Result<Vec<(RowId, Vec<Value>)>>;
}

/// In-memory row store
pub struct MemoryStorage {
    width: usize,
    rows: RwLock<Vec<Vec<Value>>>,
}

impl MemoryStorage {
    /// Create an empty store for rows with `width` columns.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Append a row and return its id.
    pub fn append(&self, row: Vec<Value>) -> Result<RowId> {
        if row.len() != self.width {
            return Err(GeoscanError::InvalidInput(format!(
                "Expected {} columns, got {}",
                self.width,
                row.len()
            )));
        }
        let mut rows = self.rows.write();
        rows.push(row);
        Ok((rows.len() - 1) as RowId)
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

fn project(row: &[Value], column_ids: &[usize]) -> Result<Vec<Value>> {
    column_ids
        .iter()
        .map(|&column| {
            row.get(column).cloned().ok_or_else(|| {
                GeoscanError::InvalidInput(format!("Column {} out of range", column))
            })
        })
        .collect()
}

impl StorageBackend for MemoryStorage {
    fn cardinality(&self) -> u64 {
        self.rows.read().len() as u64
    }

    fn scan(
        &self,
        column_ids: &[usize],
        visit: &mut dyn FnMut(RowId, Vec<Value>) -> Result<()>,
    ) -> Result<()> {
        let rows = self.rows.read();
        for (row_id, row) in rows.iter().enumerate() {
            visit(row_id as RowId, project(row, column_ids)?)?;
        }
        Ok(())
    }

    fn fetch(&self, row_ids: &[RowId], column_ids: &[usize]) -> Result<Vec<(RowId, Vec<Value>)>> {
        let rows = self.rows.read();
        let mut out = Vec::with_capacity(row_ids.len());
        for &row_id in row_ids {
            let Some(row) = usize::try_from(row_id).ok().and_then(|i| rows.get(i)) else {
                continue;
            };
            out.push((row_id, project(row, column_ids)?));
        }
        Ok(out)
    }
}
