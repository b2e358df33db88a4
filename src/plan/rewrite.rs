//! Replaces sequential scans with R-tree index scans.
//!
//! Two plan shapes are recognized:
//!
//! - a filter with a single predicate directly above a table scan, and
//! - a table scan carrying exactly one pushed-down expression filter.
//!
//! When the predicate is an indexable spatial relation between an index key
//! and a constant geometry, the scan's access method becomes an index scan
//! over the constant's bounding box. The index only narrows candidates by
//! bounding box, so any filters that were pushed into the scan are pulled
//! back out into a filter above it. Shapes that don't match are left as they
//! are.

use super::filter::TableFilter;
use super::matcher::SpatialPredicateMatcher;
use super::operator::{LogicalFilter, LogicalGet, LogicalOperator, OperatorKind, ScanFunction};
use super::optimizer::OptimizerRule;
use crate::error::{GeoscanError, Result};
use crate::executor::ExpressionExecutor;
use crate::expression::{ColumnBinding, Expression};
use crate::function::FunctionRegistry;
use crate::index::RTreeIndex;
use crate::scan::{IndexScanBindData, RTreeIndexScan};
use crate::types::{BoundingBox2D, Value};
use std::sync::Arc;

/// How the index key must be expressed to be found in the predicate.
#[derive(Debug, Clone, Copy)]
enum KeyBinding {
    /// Over the scan's output, as in a filter above the scan
    ScanOutput,
    /// Over the single column of a pushed-down table filter
    FilterColumn(usize),
}

pub struct RTreeIndexScanRule {
    functions: FunctionRegistry,
}

impl RTreeIndexScanRule {
    pub const NAME: &'static str = "rtree_index_scan";

    /// `functions` is used to fold constant operands that are not yet
    /// literals.
    pub fn new(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    /// Try to rewrite `plan` itself. Returns whether it was rewritten.
    fn try_optimize(&self, plan: &mut LogicalOperator) -> Result<bool> {
        match &plan.kind {
            OperatorKind::Filter(filter) => {
                let [predicate] = filter.expressions.as_slice() else {
                    return Ok(false);
                };
                let predicate = predicate.clone();
                let [child] = plan.children.as_mut_slice() else {
                    return Ok(false);
                };
                if child.as_get().is_none() {
                    return Ok(false);
                }
                self.try_optimize_get(child, &predicate, KeyBinding::ScanOutput)
            }
            OperatorKind::Get(get) => {
                let mut expression_filters = get
                    .table_filters
                    .iter()
                    .filter_map(|(&column_id, filter)| match filter {
                        TableFilter::Expression(filter) => {
                            Some((column_id, filter.expr.clone()))
                        }
                        _ => None,
                    });
                let Some((column_id, predicate)) = expression_filters.next() else {
                    return Ok(false);
                };
                if expression_filters.next().is_some() {
                    log::trace!("Not rewriting scan: more than one expression filter");
                    return Ok(false);
                }
                self.try_optimize_get(plan, &predicate, KeyBinding::FilterColumn(column_id))
            }
            _ => Ok(false),
        }
    }

    /// `scan` must be a [`OperatorKind::Get`] node.
    fn try_optimize_get(
        &self,
        scan: &mut LogicalOperator,
        predicate: &Expression,
        binding: KeyBinding,
    ) -> Result<bool> {
        let Some(get) = scan.as_get() else {
            return Ok(false);
        };
        if !get.function.is_seq_scan() {
            log::trace!("Not rewriting scan of {}: not a sequential scan", get.table.name());
            return Ok(false);
        }
        if !get.dynamic_filters.is_empty() {
            log::trace!("Not rewriting scan of {}: has dynamic filters", get.table.name());
            return Ok(false);
        }
        if !get.table.is_native() {
            log::trace!("Not rewriting scan of {}: not a native table", get.table.name());
            return Ok(false);
        }

        let Some((index, bbox)) = self.find_index(get, predicate, binding) else {
            return Ok(false);
        };

        // Nothing is modified until the residual filter is known.
        let residual = pull_up_filters(get)?;

        let bind = IndexScanBindData::new(Arc::clone(&get.table), index, bbox);
        let cardinality = RTreeIndexScan::cardinality(&bind);
        log::debug!(
            "Rewriting scan of {} to use index {} with {} (~{} rows)",
            get.table.name(),
            bind.index.name(),
            bbox,
            cardinality
        );

        let Some(get) = scan.as_get_mut() else {
            return Ok(false);
        };
        get.function = ScanFunction::RTreeIndexScan(bind);
        get.estimated_cardinality = cardinality;

        if let Some(filter) = residual {
            get.table_filters.clear();
            get.projection_ids.clear();
            let get_node = std::mem::replace(
                scan,
                LogicalOperator {
                    kind: OperatorKind::Filter(filter),
                    children: Vec::new(),
                },
            );
            scan.children.push(get_node);
        }
        Ok(true)
    }

    /// First index of the scanned table whose key, bound as `binding`,
    /// matches `predicate`, together with the query box.
    fn find_index(
        &self,
        get: &LogicalGet,
        predicate: &Expression,
        binding: KeyBinding,
    ) -> Option<(Arc<RTreeIndex>, BoundingBox2D)> {
        for index in get.table.indexes() {
            let [key] = index.unbound_expressions() else {
                continue;
            };
            let Some(key) = bind_index_key(key, get, binding) else {
                log::trace!(
                    "Index {} key is not available in the scan of {}",
                    index.name(),
                    get.table.name()
                );
                continue;
            };
            let Some(matched) = SpatialPredicateMatcher::new(&key).matches(predicate) else {
                continue;
            };
            let Some(bbox) = self.constant_bbox(matched.constant) else {
                log::trace!("Cannot derive a bounding box from {}", matched.constant);
                continue;
            };
            log::trace!(
                "Predicate {} matches index {} ({})",
                predicate,
                index.name(),
                matched.relation
            );
            return Some((index, bbox));
        }
        None
    }

    /// Bounding box of a foldable geometry operand. `None` for NULL, empty
    /// or non-geometry values and for operands that fail to fold.
    fn constant_bbox(&self, constant: &Expression) -> Option<BoundingBox2D> {
        let value = match constant {
            Expression::Constant { value, .. } => value.clone(),
            _ => ExpressionExecutor::new(&self.functions)
                .evaluate(constant, &[])
                .ok()?,
        };
        let Value::Geometry(geometry) = value else {
            return None;
        };
        BoundingBox2D::from_geometry(&geometry).filter(BoundingBox2D::is_valid)
    }
}

impl OptimizerRule for RTreeIndexScanRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn optimize(&self, plan: &mut LogicalOperator) -> Result<()> {
        if self.try_optimize(plan)? {
            return Ok(());
        }
        for child in &mut plan.children {
            self.optimize(child)?;
        }
        Ok(())
    }
}

/// Rewrite an index key (over table column ids) so it reads from the scan.
/// `None` when a referenced column is not available.
fn bind_index_key(key: &Expression, get: &LogicalGet, binding: KeyBinding) -> Option<Expression> {
    if let Expression::ColumnRef {
        binding: column,
        return_type,
    } = key
    {
        let column_id = column.column_index;
        return match binding {
            KeyBinding::ScanOutput => {
                let position = get.column_ids.iter().position(|&id| id == column_id)?;
                Some(Expression::column(
                    ColumnBinding::new(get.table_index, position),
                    *return_type,
                ))
            }
            KeyBinding::FilterColumn(filter_column) => (filter_column == column_id)
                .then(|| Expression::reference(0, *return_type)),
        };
    }

    let mut bound = key.clone();
    let children = key
        .children()
        .into_iter()
        .map(|child| bind_index_key(child, get, binding))
        .collect::<Option<Vec<_>>>()?;
    for (slot, child) in bound.children_mut().into_iter().zip(children) {
        *slot = child;
    }
    Some(bound)
}

/// The filter that must sit above `get` once its pushed-down filters are
/// removed, or `None` when it has none.
fn pull_up_filters(get: &LogicalGet) -> Result<Option<LogicalFilter>> {
    if get.table_filters.is_empty() {
        return Ok(None);
    }

    let mut expressions = Vec::with_capacity(get.table_filters.len());
    for (&column_id, filter) in &get.table_filters {
        let position = get
            .column_ids
            .iter()
            .position(|&id| id == column_id)
            .ok_or_else(|| {
                GeoscanError::Internal(format!(
                    "Could not find column id {} for filter on {}",
                    column_id,
                    get.table.name()
                ))
            })?;
        let return_type = get.returned_types.get(column_id).copied().ok_or_else(|| {
            GeoscanError::Internal(format!(
                "Filter column {} out of range for {}",
                column_id,
                get.table.name()
            ))
        })?;
        let column = Expression::column(ColumnBinding::new(get.table_index, position), return_type);
        expressions.push(filter.to_expression(&column));
    }

    Ok(Some(LogicalFilter {
        expressions,
        projection_map: get.projection_ids.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ColumnDefinition, TableEntry, TableKind};
    use crate::config::Config;
    use crate::expression::CompareOp;
    use crate::function::{ScalarFunction, SpatialRelation};
    use crate::index::IndexDefinition;
    use crate::storage::MemoryStorage;
    use crate::types::LogicalType;
    use geo::{Geometry, Point, Rect, coord};

    fn catalog() -> (Catalog, Arc<TableEntry>) {
        let catalog = Catalog::new(Config::default().with_fanout(4));
        let storage = MemoryStorage::new(3);
        for i in 0..30 {
            storage
                .append(vec![
                    Value::BigInt(i),
                    Value::Double(i as f64),
                    Value::Geometry(Point::new(i as f64, i as f64).into()),
                ])
                .unwrap();
        }
        let columns = vec![
            ColumnDefinition::new("id", LogicalType::BigInt),
            ColumnDefinition::new("price", LogicalType::Double),
            ColumnDefinition::new("geom", LogicalType::Geometry),
        ];
        let table = catalog
            .create_table(TableEntry::new("t", columns, TableKind::Native, Arc::new(storage)))
            .unwrap();
        catalog
            .create_index(&IndexDefinition::new(
                "t_geom",
                "t",
                vec![Expression::column(ColumnBinding::new(0, 2), LogicalType::Geometry)],
            ))
            .unwrap();
        (catalog, table)
    }

    fn window() -> Expression {
        Expression::constant(Value::Geometry(Geometry::Rect(Rect::new(
            coord! { x: 2.0, y: 2.0 },
            coord! { x: 5.0, y: 5.0 },
        ))))
    }

    fn intersects(key: Expression) -> Expression {
        Expression::function(
            ScalarFunction::spatial_predicate(SpatialRelation::Intersects),
            vec![key, window()],
        )
    }

    fn rule(catalog: &Catalog) -> RTreeIndexScanRule {
        RTreeIndexScanRule::new(catalog.functions().clone())
    }

    #[test]
    fn test_bind_index_key_to_scan_output() {
        let (_catalog, table) = catalog();
        let get = LogicalGet::new(3, table, vec![1, 2]);
        let key = Expression::column(ColumnBinding::new(0, 2), LogicalType::Geometry);

        let bound = bind_index_key(&key, &get, KeyBinding::ScanOutput).unwrap();
        assert_eq!(bound, Expression::column(ColumnBinding::new(3, 1), LogicalType::Geometry));

        let bound = bind_index_key(&key, &get, KeyBinding::FilterColumn(2)).unwrap();
        assert_eq!(bound, Expression::reference(0, LogicalType::Geometry));
        assert!(bind_index_key(&key, &get, KeyBinding::FilterColumn(1)).is_none());

        let narrow = LogicalGet::new(3, Arc::clone(&get.table), vec![0]);
        assert!(bind_index_key(&key, &narrow, KeyBinding::ScanOutput).is_none());
    }

    #[test]
    fn test_filter_over_scan_is_rewritten() {
        let (catalog, table) = catalog();
        let get = LogicalGet::new(0, table, vec![0, 2]);
        let predicate = intersects(Expression::column(ColumnBinding::new(0, 1), LogicalType::Geometry));
        let mut plan = LogicalOperator::filter(LogicalFilter::new(vec![predicate]), LogicalOperator::get(get));

        rule(&catalog).optimize(&mut plan).unwrap();

        assert_eq!(plan.name(), "FILTER");
        let scan = plan.children[0].as_get().unwrap();
        let bind = scan.function.index_scan().unwrap();
        assert_eq!(bind.bbox, BoundingBox2D::new(2.0, 2.0, 5.0, 5.0));
        assert_eq!(bind.index.name(), "t_geom");
        assert!(scan.estimated_cardinality >= 4);
        assert!(scan.estimated_cardinality <= 30);
    }

    #[test]
    fn test_folds_non_literal_constant() {
        let (catalog, table) = catalog();
        let mut functions = catalog.functions().clone();
        functions.register(
            "ST_MakeEnvelope",
            Arc::new(|_args: &[Value]| -> Result<Value> {
                Ok(Value::Geometry(Geometry::Rect(Rect::new(
                    coord! { x: 0.0, y: 0.0 },
                    coord! { x: 1.0, y: 1.0 },
                ))))
            }),
        );
        let envelope = Expression::function(
            ScalarFunction::new("ST_MakeEnvelope", vec![], LogicalType::Geometry),
            vec![],
        );
        let predicate = Expression::function(
            ScalarFunction::spatial_predicate(SpatialRelation::Within),
            vec![
                Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry),
                envelope,
            ],
        );
        let get = LogicalGet::new(0, table, vec![2]);
        let mut plan = LogicalOperator::filter(LogicalFilter::new(vec![predicate]), LogicalOperator::get(get));

        RTreeIndexScanRule::new(functions).optimize(&mut plan).unwrap();
        let bind = plan.children[0].as_get().unwrap().function.index_scan().unwrap();
        assert_eq!(bind.bbox, BoundingBox2D::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_pushed_expression_filter_is_pulled_up() {
        let (catalog, table) = catalog();
        let get = LogicalGet::new(0, table, vec![0, 2])
            .with_projection(vec![0])
            .with_table_filter(
                2,
                TableFilter::expression(intersects(Expression::reference(0, LogicalType::Geometry))),
            );
        let mut plan = LogicalOperator::get(get);

        rule(&catalog).optimize(&mut plan).unwrap();

        let filter = plan.as_filter().unwrap();
        assert_eq!(filter.projection_map, vec![0]);
        assert_eq!(
            filter.expressions,
            vec![intersects(Expression::column(ColumnBinding::new(0, 1), LogicalType::Geometry))]
        );
        let scan = plan.children[0].as_get().unwrap();
        assert!(scan.table_filters.is_empty());
        assert!(scan.projection_ids.is_empty());
        assert!(scan.function.index_scan().is_some());
        assert_eq!(plan.column_bindings(), vec![ColumnBinding::new(0, 0)]);
    }

    #[test]
    fn test_two_expression_filters_are_not_rewritten() {
        let (catalog, table) = catalog();
        let price_check = Expression::comparison(
            CompareOp::GreaterThan,
            Expression::reference(0, LogicalType::Double),
            Expression::constant(Value::Double(3.0)),
        );
        let get = LogicalGet::new(0, table, vec![1, 2])
            .with_table_filter(1, TableFilter::expression(price_check))
            .with_table_filter(
                2,
                TableFilter::expression(intersects(Expression::reference(0, LogicalType::Geometry))),
            );
        let mut plan = LogicalOperator::get(get);
        let before = plan.clone();
        rule(&catalog).optimize(&mut plan).unwrap();
        assert_eq!(plan, before);
    }

    #[test]
    fn test_ineligible_scans_are_untouched() {
        let (catalog, table) = catalog();
        let predicate = intersects(Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry));

        let mut with_dynamic = LogicalGet::new(0, Arc::clone(&table), vec![2]);
        with_dynamic.dynamic_filters.push(Expression::constant(Value::Boolean(true)));
        let mut plan = LogicalOperator::filter(
            LogicalFilter::new(vec![predicate.clone()]),
            LogicalOperator::get(with_dynamic),
        );
        let before = plan.clone();
        rule(&catalog).optimize(&mut plan).unwrap();
        assert_eq!(plan, before);

        let external = Arc::new(TableEntry::new(
            "ext",
            table.columns().to_vec(),
            TableKind::External,
            Arc::clone(table.storage()),
        ));
        let mut plan = LogicalOperator::filter(
            LogicalFilter::new(vec![predicate]),
            LogicalOperator::get(LogicalGet::new(0, external, vec![2])),
        );
        let before = plan.clone();
        rule(&catalog).optimize(&mut plan).unwrap();
        assert_eq!(plan, before);
    }

    #[test]
    fn test_empty_constant_is_ineligible() {
        let (catalog, table) = catalog();
        let empty = Expression::constant(Value::Geometry(Geometry::MultiPoint(
            geo::MultiPoint::<f64>::new(vec![]),
        )));
        let predicate = Expression::function(
            ScalarFunction::spatial_predicate(SpatialRelation::Intersects),
            vec![
                Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry),
                empty,
            ],
        );
        let mut plan = LogicalOperator::filter(
            LogicalFilter::new(vec![predicate]),
            LogicalOperator::get(LogicalGet::new(0, table, vec![2])),
        );
        let before = plan.clone();
        rule(&catalog).optimize(&mut plan).unwrap();
        assert_eq!(plan, before);
    }

    #[test]
    fn test_missing_filter_column_is_internal_error() {
        let (catalog, table) = catalog();
        let get = LogicalGet::new(0, table, vec![2])
            .with_table_filter(1, TableFilter::comparison(CompareOp::GreaterThan, 10.0));
        let predicate = intersects(Expression::column(ColumnBinding::new(0, 0), LogicalType::Geometry));
        let mut plan = LogicalOperator::filter(LogicalFilter::new(vec![predicate]), LogicalOperator::get(get));
        let before = plan.clone();

        let result = rule(&catalog).optimize(&mut plan);
        assert!(matches!(result, Err(GeoscanError::Internal(_))));
        assert_eq!(plan, before);
    }
}
