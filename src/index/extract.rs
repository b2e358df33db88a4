//! Key extraction: turns table rows into index entries.
//!
//! The index key expression is written against table columns (a
//! [`Expression::ColumnRef`] whose `column_index` is the table column id).
//! The extractor binds it to the scanned column layout once, then for every
//! row evaluates it, skips NULL and empty geometries, and emits the row's
//! approximate single-precision bounding box.

use crate::error::{GeoscanError, Result};
use crate::executor::ExpressionExecutor;
use crate::expression::Expression;
use crate::function::FunctionRegistry;
use crate::storage::StorageBackend;
use crate::types::{BoundingBox2D, Entry, LogicalType, RowId, Value};
use geo::Geometry;

/// Counters reported by [`KeyExtractor::extract`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub rows_scanned: u64,
    pub entries: u64,
    pub null_keys: u64,
    pub empty_keys: u64,
}

pub struct KeyExtractor<'a> {
    executor: ExpressionExecutor<'a>,
    key: Expression,
    column_ids: Vec<usize>,
}

impl<'a> KeyExtractor<'a> {
    /// Bind `key` to a scan that reads exactly the table columns it uses.
    pub fn new(registry: &'a FunctionRegistry, key: &Expression) -> Self {
        let mut column_ids: Vec<usize> = key
            .column_bindings()
            .iter()
            .map(|binding| binding.column_index)
            .collect();
        column_ids.sort_unstable();
        column_ids.dedup();

        let mut bound = key.clone();
        bind_to_scan(&mut bound, &column_ids);

        Self {
            executor: ExpressionExecutor::new(registry),
            key: bound,
            column_ids,
        }
    }

    /// Table columns the extractor reads, in scan order.
    pub fn column_ids(&self) -> &[usize] {
        &self.column_ids
    }

    /// Entry for one row laid out as [`KeyExtractor::column_ids`], or `None`
    /// when the key is NULL or an empty geometry.
    pub fn extract_row(&self, row_id: RowId, row: &[Value]) -> Result<Option<Entry>> {
        match self.evaluate_key(row_id, row)? {
            Some(geometry) => entry_for(row_id, &geometry),
            None => Ok(None),
        }
    }

    fn evaluate_key(&self, row_id: RowId, row: &[Value]) -> Result<Option<Geometry<f64>>> {
        let key = self
            .executor
            .evaluate(&self.key, row)
            .map_err(|e| GeoscanError::KeyEvaluation {
                row_id,
                message: e.to_string(),
            })?;

        match key {
            Value::Null => Ok(None),
            Value::Geometry(geometry) => Ok(Some(geometry)),
            other => Err(GeoscanError::KeyEvaluation {
                row_id,
                message: format!(
                    "Index key must be {}, got {}",
                    LogicalType::Geometry,
                    other
                        .logical_type()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "NULL".to_string())
                ),
            }),
        }
    }

    /// Scan `storage` and hand every extracted entry to `sink`.
    ///
    /// The first evaluation error aborts the scan and is returned.
    pub fn extract(
        &self,
        storage: &dyn StorageBackend,
        sink: &mut dyn FnMut(Entry),
    ) -> Result<ExtractionSummary> {
        let mut summary = ExtractionSummary::default();
        storage.scan(&self.column_ids, &mut |row_id, row| {
            summary.rows_scanned += 1;
            let Some(geometry) = self.evaluate_key(row_id, &row)? else {
                summary.null_keys += 1;
                return Ok(());
            };
            match entry_for(row_id, &geometry)? {
                Some(entry) => {
                    summary.entries += 1;
                    sink(entry);
                }
                None => summary.empty_keys += 1,
            }
            Ok(())
        })?;
        log::debug!(
            "Extracted {} index entries from {} rows ({} NULL, {} empty)",
            summary.entries,
            summary.rows_scanned,
            summary.null_keys,
            summary.empty_keys
        );
        Ok(summary)
    }
}

fn entry_for(row_id: RowId, geometry: &Geometry<f64>) -> Result<Option<Entry>> {
    let Some(bbox) = BoundingBox2D::from_geometry(geometry) else {
        return Ok(None);
    };
    if !bbox.is_valid() {
        return Err(GeoscanError::KeyEvaluation {
            row_id,
            message: format!("Geometry has non-finite bounds {}", bbox),
        });
    }
    Ok(Some(Entry::new(bbox, row_id)))
}

/// Rewrite table column references into positions of `column_ids`.
fn bind_to_scan(expr: &mut Expression, column_ids: &[usize]) {
    if let Expression::ColumnRef {
        binding,
        return_type,
    } = expr
        && let Ok(position) = column_ids.binary_search(&binding.column_index)
    {
        *expr = Expression::reference(position, *return_type);
        return;
    }
    for child in expr.children_mut() {
        bind_to_scan(child, column_ids);
    }
}
