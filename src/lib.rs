//! Packed R-tree secondary index over 2D geometry columns, with a plan
//! rewrite that turns eligible full scans into index range scans.
//!
//! ```rust
//! use geoscan::prelude::*;
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new(Config::default().with_fanout(8));
//! let storage = MemoryStorage::new(1);
//! for i in 0..100 {
//!     storage.append(vec![Value::Geometry(Point::new(i as f64, i as f64).into())])?;
//! }
//! let columns = vec![ColumnDefinition::new("geom", LogicalType::Geometry)];
//! catalog.create_table(TableEntry::new("pts", columns, TableKind::Native, Arc::new(storage)))?;
//!
//! let key = Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry);
//! let index = catalog.create_index(&IndexDefinition::new("pts_geom", "pts", vec![key]))?;
//!
//! let hits: Vec<i64> = index.search(&BoundingBox2D::new(10.0, 10.0, 12.0, 12.0)).collect();
//! assert_eq!(hits.len(), 3);
//! # Ok::<(), geoscan::GeoscanError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod expression;
pub mod function;
pub mod index;
pub mod plan;
pub mod scan;
pub mod storage;
pub mod types;

pub use catalog::{Catalog, ColumnDefinition, TableEntry, TableKind};
pub use config::{Config, SortKey};
pub use error::{GeoscanError, Result};
pub use expression::{ColumnBinding, Expression};
pub use function::{FunctionRegistry, ScalarFunction, SpatialRelation};
pub use index::{IndexDefinition, RTree, RTreeBuilder, RTreeIndex, RTreeStats};
pub use plan::{LogicalOperator, PlanExecutor, PlannerContext};
pub use scan::{IndexScanBindData, RTreeIndexScan};
pub use storage::{MemoryStorage, StorageBackend};
pub use types::{BoundingBox2D, Entry, LogicalType, RowId, Value};

#[cfg(feature = "snapshot")]
pub use index::snapshot::TreeSnapshot;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoscanError, Result};

    pub use crate::{Catalog, ColumnDefinition, TableEntry, TableKind};

    pub use crate::{Config, SortKey};

    pub use crate::{ColumnBinding, Expression, FunctionRegistry, ScalarFunction, SpatialRelation};

    pub use crate::{IndexDefinition, RTree, RTreeBuilder, RTreeIndex};

    pub use crate::plan::{LogicalFilter, LogicalGet, LogicalOperator, PlanExecutor, PlannerContext, TableFilter};

    pub use crate::{MemoryStorage, StorageBackend};

    pub use crate::{BoundingBox2D, Entry, LogicalType, RowId, Value};

    pub use geo::{Geometry, Point, Polygon, Rect};
}
