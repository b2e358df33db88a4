//! Tables and their R-tree indexes.
//!
//! An index becomes visible only once its build has finished; a failed build
//! leaves the catalog untouched. Indexes are shared as `Arc<RTreeIndex>`, so
//! dropping an index while a query still holds it only unlinks it from the
//! catalog.

use crate::config::Config;
use crate::error::{GeoscanError, Result};
use crate::function::FunctionRegistry;
use crate::index::{IndexDefinition, RTree, RTreeIndex};
use crate::storage::StorageBackend;
use crate::types::LogicalType;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Where a table's rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Rows owned by the engine's storage layer
    Native,
    /// Rows produced by a table function or foreign reader
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub logical_type: LogicalType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

pub struct TableEntry {
    name: String,
    columns: Vec<ColumnDefinition>,
    kind: TableKind,
    storage: Arc<dyn StorageBackend>,
    indexes: RwLock<Vec<Arc<RTreeIndex>>>,
}

impl TableEntry {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDefinition>,
        kind: TableKind,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            kind,
            storage,
            indexes: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, column_id: usize) -> Option<&ColumnDefinition> {
        self.columns.get(column_id)
    }

    pub fn column_id(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn is_native(&self) -> bool {
        self.kind == TableKind::Native
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn cardinality(&self) -> u64 {
        self.storage.cardinality()
    }

    /// Indexes published on this table at the time of the call.
    pub fn indexes(&self) -> Vec<Arc<RTreeIndex>> {
        self.indexes.read().clone()
    }

    pub fn index(&self, name: &str) -> Option<Arc<RTreeIndex>> {
        self.indexes
            .read()
            .iter()
            .find(|index| index.name() == name)
            .cloned()
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    fn publish(&self, index: RTreeIndex) -> Result<Arc<RTreeIndex>> {
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|existing| existing.name() == index.name()) {
            return Err(GeoscanError::IndexAlreadyExists(index.name().to_string()));
        }
        let index = Arc::new(index);
        indexes.push(Arc::clone(&index));
        Ok(index)
    }

    fn unlink(&self, name: &str) -> Option<Arc<RTreeIndex>> {
        let mut indexes = self.indexes.write();
        let position = indexes.iter().position(|index| index.name() == name)?;
        Some(indexes.remove(position))
    }
}

impl fmt::Debug for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indexes: Vec<String> = self
            .indexes
            .read()
            .iter()
            .map(|index| index.name().to_string())
            .collect();
        f.debug_struct("TableEntry")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("kind", &self.kind)
            .field("indexes", &indexes)
            .finish()
    }
}

/// Table and index registry.
pub struct Catalog {
    config: Config,
    functions: FunctionRegistry,
    tables: RwLock<FxHashMap<String, Arc<TableEntry>>>,
}

impl Catalog {
    /// Catalog with the built-in spatial predicates registered.
    pub fn new(config: Config) -> Self {
        Self::with_functions(config, FunctionRegistry::with_spatial_predicates())
    }

    pub fn with_functions(config: Config, functions: FunctionRegistry) -> Self {
        Self {
            config,
            functions,
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn create_table(&self, table: TableEntry) -> Result<Arc<TableEntry>> {
        let mut tables = self.tables.write();
        if tables.contains_key(table.name()) {
            return Err(GeoscanError::TableAlreadyExists(table.name().to_string()));
        }
        let table = Arc::new(table);
        tables.insert(table.name().to_string(), Arc::clone(&table));
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableEntry>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GeoscanError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a table together with all of its indexes.
    pub fn drop_table(&self, name: &str) -> Result<Arc<TableEntry>> {
        self.tables
            .write()
            .remove(name)
            .ok_or_else(|| GeoscanError::TableNotFound(name.to_string()))
    }

    /// Build an index from the table's current rows and publish it.
    pub fn create_index(&self, definition: &IndexDefinition) -> Result<Arc<RTreeIndex>> {
        let table = self.prepare_index(definition)?;
        let index = RTreeIndex::create(
            definition,
            table.storage().as_ref(),
            &self.functions,
            &self.config,
        )?;
        let index = self.publish(&table, index)?;
        log::debug!("Published index {} on table {}", index.name(), table.name());
        Ok(index)
    }

    /// Publish an index over an already built tree, e.g. one loaded from a
    /// snapshot. The tree is validated before it becomes visible.
    pub fn attach_index(&self, definition: &IndexDefinition, tree: RTree) -> Result<Arc<RTreeIndex>> {
        let table = self.prepare_index(definition)?;
        tree.validate()?;
        self.publish(&table, RTreeIndex::from_tree(definition, tree))
    }

    pub fn drop_index(&self, name: &str) -> Result<Arc<RTreeIndex>> {
        let tables = self.tables.write();
        tables
            .values()
            .find_map(|table| table.unlink(name))
            .ok_or_else(|| GeoscanError::IndexNotFound(name.to_string()))
    }

    pub fn index(&self, name: &str) -> Option<Arc<RTreeIndex>> {
        self.tables
            .read()
            .values()
            .find_map(|table| table.index(name))
    }

    /// Index names are unique across the catalog. The check and the insert
    /// happen under the table map's write lock.
    fn publish(&self, table: &Arc<TableEntry>, index: RTreeIndex) -> Result<Arc<RTreeIndex>> {
        let tables = self.tables.write();
        if !tables
            .get(table.name())
            .is_some_and(|current| Arc::ptr_eq(current, table))
        {
            return Err(GeoscanError::TableNotFound(table.name().to_string()));
        }
        if tables.values().any(|other| other.has_index(index.name())) {
            return Err(GeoscanError::IndexAlreadyExists(index.name().to_string()));
        }
        table.publish(index)
    }

    fn prepare_index(&self, definition: &IndexDefinition) -> Result<Arc<TableEntry>> {
        definition.validate()?;
        let table = self.table(&definition.table)?;
        if self.index(&definition.name).is_some() {
            return Err(GeoscanError::IndexAlreadyExists(definition.name.clone()));
        }
        for &column_id in &definition.column_ids {
            if table.column(column_id).is_none() {
                return Err(GeoscanError::InvalidInput(format!(
                    "Table {} has no column {}",
                    table.name(),
                    column_id
                )));
            }
        }
        Ok(table)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .field("tables", &self.table_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ColumnBinding, Expression};
    use crate::storage::MemoryStorage;
    use crate::types::{BoundingBox2D, Value};
    use geo::Point;

    fn catalog_with_points(n: i64) -> Catalog {
        let catalog = Catalog::new(Config::default().with_fanout(4));
        let storage = MemoryStorage::new(2);
        for i in 0..n {
            storage
                .append(vec![
                    Value::BigInt(i),
                    Value::Geometry(Point::new(i as f64, 0.0).into()),
                ])
                .unwrap();
        }
        let columns = vec![
            ColumnDefinition::new("id", LogicalType::BigInt),
            ColumnDefinition::new("geom", LogicalType::Geometry),
        ];
        catalog
            .create_table(TableEntry::new("pts", columns, TableKind::Native, Arc::new(storage)))
            .unwrap();
        catalog
    }

    fn geom_index(name: &str) -> IndexDefinition {
        IndexDefinition::new(
            name,
            "pts",
            vec![Expression::column(ColumnBinding::new(0, 1), LogicalType::Geometry)],
        )
    }

    #[test]
    fn test_create_and_drop_index() {
        let catalog = catalog_with_points(20);
        let index = catalog.create_index(&geom_index("pts_geom")).unwrap();
        assert_eq!(index.len(), 20);

        let table = catalog.table("pts").unwrap();
        assert!(table.has_index("pts_geom"));
        assert_eq!(table.column_id("GEOM"), Some(1));

        let dropped = catalog.drop_index("pts_geom").unwrap();
        assert!(!table.has_index("pts_geom"));
        // Readers holding the index keep it alive.
        assert_eq!(dropped.search(&BoundingBox2D::point(3.0, 0.0)).count(), 1);
        assert!(matches!(
            catalog.drop_index("pts_geom"),
            Err(GeoscanError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let catalog = catalog_with_points(5);
        catalog.create_index(&geom_index("idx")).unwrap();
        assert!(matches!(
            catalog.create_index(&geom_index("idx")),
            Err(GeoscanError::IndexAlreadyExists(_))
        ));

        let storage = Arc::new(MemoryStorage::new(0));
        let dup = TableEntry::new("pts", vec![], TableKind::Native, storage);
        assert!(matches!(
            catalog.create_table(dup),
            Err(GeoscanError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_failed_build_publishes_nothing() {
        let catalog = catalog_with_points(5);
        let table = catalog.table("pts").unwrap();
        // Column 0 is BIGINT; declaring it GEOMETRY passes validation but
        // fails on the first row.
        let bad = IndexDefinition::new(
            "bad",
            "pts",
            vec![Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry)],
        );
        assert!(matches!(
            catalog.create_index(&bad),
            Err(GeoscanError::KeyEvaluation { .. })
        ));
        assert!(table.indexes().is_empty());
        assert!(catalog.index("bad").is_none());
    }

    #[test]
    fn test_missing_table_and_column() {
        let catalog = catalog_with_points(1);
        let mut definition = geom_index("idx");
        definition.table = "nope".to_string();
        assert!(matches!(
            catalog.create_index(&definition),
            Err(GeoscanError::TableNotFound(_))
        ));

        let out_of_range = IndexDefinition::new(
            "idx",
            "pts",
            vec![Expression::column(ColumnBinding::new(0, 9), LogicalType::Geometry)],
        );
        assert!(matches!(
            catalog.create_index(&out_of_range),
            Err(GeoscanError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_drop_table_removes_indexes() {
        let catalog = catalog_with_points(3);
        catalog.create_index(&geom_index("idx")).unwrap();
        catalog.drop_table("pts").unwrap();
        assert!(catalog.index("idx").is_none());
        assert!(catalog.table("pts").is_err());
    }

    #[test]
    fn test_concurrent_same_name_on_two_tables() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..20 {
            let catalog = Arc::new(Catalog::new(Config::default().with_fanout(4)));
            for name in ["a", "b"] {
                let storage = MemoryStorage::new(1);
                for i in 0..200 {
                    storage
                        .append(vec![Value::Geometry(Point::new(i as f64, 1.0).into())])
                        .unwrap();
                }
                let columns = vec![ColumnDefinition::new("geom", LogicalType::Geometry)];
                catalog
                    .create_table(TableEntry::new(name, columns, TableKind::Native, Arc::new(storage)))
                    .unwrap();
            }

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|table| {
                    let catalog = Arc::clone(&catalog);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let definition = IndexDefinition::new(
                            "x",
                            table,
                            vec![Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry)],
                        );
                        barrier.wait();
                        catalog.create_index(&definition)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(GeoscanError::IndexAlreadyExists(_)))));
            let owners = ["a", "b"]
                .iter()
                .filter(|name| catalog.table(name).unwrap().has_index("x"))
                .count();
            assert_eq!(owners, 1);
        }
    }

    #[test]
    fn test_publish_to_dropped_table_fails() {
        let catalog = catalog_with_points(3);
        let table = catalog.table("pts").unwrap();
        let tree = RTree::empty(4);
        catalog.drop_table("pts").unwrap();
        assert!(matches!(
            catalog.publish(&table, RTreeIndex::from_tree(&geom_index("idx"), tree)),
            Err(GeoscanError::TableNotFound(_))
        ));
        assert!(table.indexes().is_empty());
    }
}
