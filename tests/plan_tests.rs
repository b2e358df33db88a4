use geo::{Geometry, Point, Rect, coord};
use geoscan::expression::CompareOp;
use geoscan::plan::{LogicalFilter, LogicalGet, LogicalOperator, PlanExecutor, PlannerContext, TableFilter};
use geoscan::{
    Catalog, ColumnBinding, ColumnDefinition, Config, Expression, IndexDefinition, LogicalType,
    MemoryStorage, ScalarFunction, SpatialRelation, TableEntry, TableKind, Value,
};
use std::sync::Arc;

const ID: usize = 0;
const PRICE: usize = 1;
const GEOM: usize = 2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `shops(id, price, geom)` with `n` small squares on a diagonal-ish grid and
/// an R-tree index on `geom`.
fn shops(n: i64) -> (Catalog, Arc<TableEntry>) {
    let catalog = Catalog::new(Config::default().with_fanout(8));
    let storage = MemoryStorage::new(3);
    for i in 0..n {
        let x = (i % 50) as f64 * 2.0;
        let y = (i / 50) as f64 * 2.0;
        let geometry = if i % 17 == 0 {
            Value::Null
        } else {
            Value::Geometry(Geometry::Rect(Rect::new(
                coord! { x: x, y: y },
                coord! { x: x + 1.0, y: y + 1.0 },
            )))
        };
        storage
            .append(vec![Value::BigInt(i), Value::Double((i % 23) as f64), geometry])
            .unwrap();
    }
    let columns = vec![
        ColumnDefinition::new("id", LogicalType::BigInt),
        ColumnDefinition::new("price", LogicalType::Double),
        ColumnDefinition::new("geom", LogicalType::Geometry),
    ];
    let table = catalog
        .create_table(TableEntry::new("shops", columns, TableKind::Native, Arc::new(storage)))
        .unwrap();
    catalog
        .create_index(&IndexDefinition::new(
            "shops_geom",
            "shops",
            vec![Expression::column(ColumnBinding::new(0, GEOM), LogicalType::Geometry)],
        ))
        .unwrap();
    (catalog, table)
}

fn query_box() -> Expression {
    Expression::constant(Value::Geometry(Geometry::Rect(Rect::new(
        coord! { x: 10.5, y: 3.5 },
        coord! { x: 20.0, y: 9.0 },
    ))))
}

fn predicate(relation: SpatialRelation, key: Expression) -> Expression {
    Expression::function(ScalarFunction::spatial_predicate(relation), vec![key, query_box()])
}

/// Scan of (id, price, geom) as table index 0; geom is output position 2.
fn scan(table: &Arc<TableEntry>) -> LogicalGet {
    LogicalGet::new(0, Arc::clone(table), vec![ID, PRICE, GEOM])
}

fn geom_output() -> Expression {
    Expression::column(ColumnBinding::new(0, 2), LogicalType::Geometry)
}

fn operator_names(plan: &LogicalOperator) -> Vec<&'static str> {
    let mut names = Vec::new();
    plan.visit(&mut |op| names.push(op.name()));
    names
}

fn sorted_ids(rows: Vec<Vec<Value>>) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .iter()
        .map(|row| match row[0] {
            Value::BigInt(id) => id,
            ref other => panic!("unexpected id {}", other),
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_filter_over_scan_becomes_index_scan() {
    init_logging();
    let (catalog, table) = shops(500);
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![predicate(SpatialRelation::Intersects, geom_output())]),
        LogicalOperator::get(scan(&table)),
    );

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();

    assert_eq!(operator_names(&optimized), vec!["FILTER", "RTREE_INDEX_SCAN"]);
    let get = optimized.children[0].as_get().unwrap();
    let bind = get.function.index_scan().unwrap();
    assert_eq!(bind.index.name(), "shops_geom");
    assert_eq!(bind.bbox, geoscan::BoundingBox2D::new(10.5, 3.5, 20.0, 9.0));
    assert!(get.estimated_cardinality < table.cardinality());
}

#[test]
fn test_pushed_residual_is_pulled_up() {
    let (catalog, table) = shops(500);
    let get = scan(&table).with_table_filter(PRICE, TableFilter::comparison(CompareOp::GreaterThan, 10.0));
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![predicate(SpatialRelation::Intersects, geom_output())]),
        LogicalOperator::get(get),
    );

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();

    assert_eq!(
        operator_names(&optimized),
        vec!["FILTER", "FILTER", "RTREE_INDEX_SCAN"]
    );
    let residual = optimized.children[0].as_filter().unwrap();
    assert_eq!(residual.expressions.len(), 1);
    assert_eq!(residual.expressions[0].to_string(), "(#[0.1] > 10)");
    assert!(optimized.children[0].children[0].as_get().unwrap().table_filters.is_empty());
}

#[test]
fn test_pushed_spatial_filter_is_rewritten() {
    let (catalog, table) = shops(500);
    let get = scan(&table)
        .with_projection(vec![0])
        .with_table_filter(
            GEOM,
            TableFilter::expression(predicate(
                SpatialRelation::Within,
                Expression::reference(0, LogicalType::Geometry),
            )),
        )
        .with_table_filter(PRICE, TableFilter::comparison(CompareOp::GreaterThan, 10.0));
    let plan = LogicalOperator::get(get);

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();

    assert_eq!(operator_names(&optimized), vec!["FILTER", "RTREE_INDEX_SCAN"]);
    let filter = optimized.as_filter().unwrap();
    assert_eq!(filter.projection_map, vec![0]);
    let rendered: Vec<String> = filter.expressions.iter().map(|e| e.to_string()).collect();
    assert_eq!(rendered[0], "(#[0.1] > 10)");
    assert!(rendered[1].starts_with("ST_Within(#[0.2], "));
}

#[test]
fn test_unlisted_function_leaves_plan_unchanged() {
    let (catalog, table) = shops(100);
    let disjoint = Expression::function(
        ScalarFunction::new(
            "ST_Disjoint",
            vec![LogicalType::Geometry, LogicalType::Geometry],
            LogicalType::Boolean,
        ),
        vec![geom_output(), query_box()],
    );
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![disjoint]),
        LogicalOperator::get(scan(&table)),
    );
    let before = plan.clone();
    let rendered = plan.to_string();

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
    assert_eq!(optimized, before);
    assert_eq!(optimized.to_string(), rendered);
}

#[test]
fn test_multi_predicate_filter_is_not_rewritten() {
    let (catalog, table) = shops(100);
    let price_check = Expression::comparison(
        CompareOp::GreaterThan,
        Expression::column(ColumnBinding::new(0, 1), LogicalType::Double),
        Expression::constant(Value::Double(3.0)),
    );
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![
            predicate(SpatialRelation::Intersects, geom_output()),
            price_check,
        ]),
        LogicalOperator::get(scan(&table)),
    );
    let before = plan.clone();
    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
    assert_eq!(optimized, before);
}

#[test]
fn test_rewrite_inside_larger_plan() {
    let (catalog, table) = shops(300);
    let filtered = LogicalOperator::filter(
        LogicalFilter::new(vec![predicate(SpatialRelation::Contains, geom_output())]),
        LogicalOperator::get(scan(&table)),
    );
    let other = LogicalOperator::get(LogicalGet::new(1, Arc::clone(&table), vec![ID]));
    let plan = LogicalOperator::limit(
        10,
        0,
        LogicalOperator::projection(
            2,
            vec![Expression::column(ColumnBinding::new(0, 0), LogicalType::BigInt)],
            LogicalOperator::cross_product(filtered, other),
        ),
    );

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
    assert_eq!(
        operator_names(&optimized),
        vec!["LIMIT", "PROJECTION", "CROSS_PRODUCT", "FILTER", "RTREE_INDEX_SCAN", "SEQ_SCAN"]
    );
}

#[test]
fn test_disabled_rule() {
    let (_catalog, table) = shops(50);
    let catalog = Catalog::new(Config::default().with_index_scan(false));
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![predicate(SpatialRelation::Intersects, geom_output())]),
        LogicalOperator::get(scan(&table)),
    );
    let before = plan.clone();
    assert_eq!(PlannerContext::new(&catalog).optimize(plan).unwrap(), before);
}

#[test]
fn test_index_scan_returns_same_rows_as_full_scan() {
    init_logging();
    let (catalog, table) = shops(2_000);
    let executor = PlanExecutor::new(catalog.functions(), catalog.config().scan_batch_size);

    for relation in [SpatialRelation::Intersects, SpatialRelation::Contains, SpatialRelation::Within] {
        let get = scan(&table).with_table_filter(PRICE, TableFilter::comparison(CompareOp::GreaterThan, 10.0));
        let plan = LogicalOperator::filter(
            LogicalFilter::new(vec![predicate(relation, geom_output())]),
            LogicalOperator::get(get),
        );
        let expected = sorted_ids(executor.execute(&plan).unwrap());

        let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
        assert!(optimized.gets()[0].function.index_scan().is_some());
        let actual = sorted_ids(executor.execute(&optimized).unwrap());
        assert_eq!(actual, expected, "relation {}", relation);
    }
}

#[test]
fn test_index_scan_with_projection_matches_full_scan() {
    let (catalog, table) = shops(1_000);
    let executor = PlanExecutor::new(catalog.functions(), 7);
    let get = scan(&table)
        .with_projection(vec![0])
        .with_table_filter(
            GEOM,
            TableFilter::expression(predicate(
                SpatialRelation::Intersects,
                Expression::reference(0, LogicalType::Geometry),
            )),
        )
        .with_table_filter(PRICE, TableFilter::comparison(CompareOp::LessThanOrEqual, 5.0));
    let plan = LogicalOperator::get(get);

    let expected = executor.execute(&plan).unwrap();
    assert!(expected.iter().all(|row| row.len() == 1));

    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
    let actual = executor.execute(&optimized).unwrap();
    assert!(actual.iter().all(|row| row.len() == 1));
    assert_eq!(sorted_ids(actual), sorted_ids(expected));
}

#[test]
fn test_point_query() {
    let (catalog, table) = shops(200);
    let point = Expression::constant(Value::Geometry(Point::new(4.5, 0.5).into()));
    let plan = LogicalOperator::filter(
        LogicalFilter::new(vec![Expression::function(
            ScalarFunction::spatial_predicate(SpatialRelation::Intersects),
            vec![point, geom_output()],
        )]),
        LogicalOperator::get(scan(&table)),
    );
    let optimized = PlannerContext::new(&catalog).optimize(plan).unwrap();
    let rows = PlanExecutor::new(catalog.functions(), 64)
        .execute(&optimized)
        .unwrap();
    assert_eq!(sorted_ids(rows), vec![2]);
}
