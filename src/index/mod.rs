//! R-tree secondary index.
//!
//! An [`RTreeIndex`] pairs an immutable packed [`RTree`] with the key
//! expression it was built from and the table columns that expression reads.
//! Construction goes through [`RTreeIndex::create`]:
//!
//! 1. validate the [`IndexDefinition`] (single GEOMETRY key without side
//!    effects),
//! 2. extract `(bbox, row_id)` entries from the table, skipping NULL and
//!    empty geometries,
//! 3. sort and bulk load.
//!
//! Any failure aborts the build before an index value exists.

pub mod builder;
pub mod extract;
pub mod search;
#[cfg(feature = "snapshot")]
pub mod snapshot;
pub mod sort;
pub mod stats;
pub mod tree;

pub use builder::{RTreeBuilder, bulk_load};
pub use extract::{ExtractionSummary, KeyExtractor};
pub use search::RangeSearch;
pub use stats::RTreeStats;
pub use tree::{ChildRange, Node, NodeId, RTree};

use crate::config::Config;
use crate::error::{GeoscanError, Result};
use crate::expression::Expression;
use crate::function::FunctionRegistry;
use crate::storage::StorageBackend;
use crate::types::{BoundingBox2D, LogicalType, RowId};

/// Name of the index type in catalogs and plan output.
pub const TYPE_NAME: &str = "RTREE";

/// A CREATE INDEX request.
///
/// Key expressions reference table columns with
/// [`Expression::ColumnRef`], where `column_index` is the table column id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub expressions: Vec<Expression>,
    /// Table columns read by `expressions`, ascending
    pub column_ids: Vec<usize>,
}

impl IndexDefinition {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        expressions: Vec<Expression>,
    ) -> Self {
        let mut column_ids: Vec<usize> = expressions
            .iter()
            .flat_map(Expression::column_bindings)
            .map(|binding| binding.column_index)
            .collect();
        column_ids.sort_unstable();
        column_ids.dedup();
        Self {
            name: name.into(),
            table: table.into(),
            expressions,
            column_ids,
        }
    }

    /// Reject definitions an R-tree cannot index.
    pub fn validate(&self) -> Result<()> {
        let [key] = self.expressions.as_slice() else {
            return Err(GeoscanError::InvalidIndexDefinition(
                "RTree indexes can only be created over a single column.".to_string(),
            ));
        };
        if key.return_type() != LogicalType::Geometry {
            return Err(GeoscanError::InvalidIndexDefinition(
                "RTree indexes can only be created over GEOMETRY columns.".to_string(),
            ));
        }
        if !key.is_consistent() {
            return Err(GeoscanError::InvalidIndexDefinition(
                "RTree index keys cannot contain expressions with side effects.".to_string(),
            ));
        }
        Ok(())
    }
}

/// A built R-tree index bound to one table.
#[derive(Debug)]
pub struct RTreeIndex {
    name: String,
    table_name: String,
    column_ids: Vec<usize>,
    unbound_expressions: Vec<Expression>,
    tree: RTree,
}

impl RTreeIndex {
    /// Validate `definition`, read every row of `storage` and build the tree.
    pub fn create(
        definition: &IndexDefinition,
        storage: &dyn StorageBackend,
        registry: &FunctionRegistry,
        config: &Config,
    ) -> Result<Self> {
        definition.validate()?;
        config.validate()?;

        let extractor = KeyExtractor::new(registry, &definition.expressions[0]);
        let mut builder = RTreeBuilder::from_config(config)
            .with_capacity(usize::try_from(storage.cardinality()).unwrap_or(0));
        extractor.extract(storage, &mut |entry| builder.push(entry))?;
        let tree = builder.build()?;

        log::debug!(
            "Created {} index {} on {}: {}",
            TYPE_NAME,
            definition.name,
            definition.table,
            tree.stats()
        );
        Ok(Self::from_tree(definition, tree))
    }

    /// Wrap an already built tree, e.g. one loaded from a snapshot.
    pub fn from_tree(definition: &IndexDefinition, tree: RTree) -> Self {
        Self {
            name: definition.name.clone(),
            table_name: definition.table.clone(),
            column_ids: definition.column_ids.clone(),
            unbound_expressions: definition.expressions.clone(),
            tree,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn index_type(&self) -> &'static str {
        TYPE_NAME
    }

    pub fn column_ids(&self) -> &[usize] {
        &self.column_ids
    }

    /// Key expressions over table column ids.
    pub fn unbound_expressions(&self) -> &[Expression] {
        &self.unbound_expressions
    }

    pub fn tree(&self) -> &RTree {
        &self.tree
    }

    /// Candidate row ids whose key box intersects `query`.
    pub fn search(&self, query: &BoundingBox2D) -> RangeSearch<'_> {
        self.tree.search(query)
    }

    pub fn estimate(&self, query: &BoundingBox2D) -> u64 {
        self.tree.estimate(query)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.tree.entries().iter().map(|entry| entry.row_id)
    }
}
