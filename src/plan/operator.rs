//! Logical query plans.
//!
//! A plan is a tree of [`LogicalOperator`]s. Operators expose their output
//! as a list of [`ColumnBinding`]s; expressions in parent operators refer to
//! child output through those bindings, so an operator can change how it
//! produces a column without invalidating its parents.
//!
//! A [`LogicalGet`] binds each of its scanned columns as
//! `(table_index, i)`, where `i` is the position in `column_ids`. When
//! `projection_ids` is non-empty only the listed positions are emitted, but
//! the bindings keep their `column_ids` positions.

use super::filter::TableFilter;
use crate::catalog::TableEntry;
use crate::expression::{ColumnBinding, Expression};
use crate::scan::{IndexScanBindData, RTreeIndexScan};
use crate::types::LogicalType;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Access method of a table scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanFunction {
    SeqScan,
    RTreeIndexScan(IndexScanBindData),
}

impl ScanFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ScanFunction::SeqScan => "seq_scan",
            ScanFunction::RTreeIndexScan(_) => RTreeIndexScan::NAME,
        }
    }

    pub fn is_seq_scan(&self) -> bool {
        matches!(self, ScanFunction::SeqScan)
    }

    pub fn index_scan(&self) -> Option<&IndexScanBindData> {
        match self {
            ScanFunction::RTreeIndexScan(bind) => Some(bind),
            ScanFunction::SeqScan => None,
        }
    }
}

/// Table scan.
#[derive(Debug, Clone)]
pub struct LogicalGet {
    pub table_index: usize,
    pub table: Arc<TableEntry>,
    pub function: ScanFunction,
    /// Table column ids read by the scan
    pub column_ids: Vec<usize>,
    /// Positions in `column_ids` emitted by the scan; empty emits all
    pub projection_ids: Vec<usize>,
    /// Types of all table columns, indexed by table column id
    pub returned_types: Vec<LogicalType>,
    /// Pushed-down filters keyed by table column id
    pub table_filters: BTreeMap<usize, TableFilter>,
    /// Filters bound into the scan at execution time (e.g. join-derived)
    pub dynamic_filters: Vec<Expression>,
    pub estimated_cardinality: u64,
}

impl LogicalGet {
    /// Sequential scan of `column_ids` of `table`.
    pub fn new(table_index: usize, table: Arc<TableEntry>, column_ids: Vec<usize>) -> Self {
        let returned_types = table
            .columns()
            .iter()
            .map(|column| column.logical_type)
            .collect();
        let estimated_cardinality = table.cardinality();
        Self {
            table_index,
            table,
            function: ScanFunction::SeqScan,
            column_ids,
            projection_ids: Vec::new(),
            returned_types,
            table_filters: BTreeMap::new(),
            dynamic_filters: Vec::new(),
            estimated_cardinality,
        }
    }

    pub fn with_projection(mut self, projection_ids: Vec<usize>) -> Self {
        self.projection_ids = projection_ids;
        self
    }

    pub fn with_table_filter(mut self, column_id: usize, filter: TableFilter) -> Self {
        self.table_filters.insert(column_id, filter);
        self
    }

    /// Positions in `column_ids` that the scan emits, in output order.
    pub fn output_positions(&self) -> Vec<usize> {
        if self.projection_ids.is_empty() {
            (0..self.column_ids.len()).collect()
        } else {
            self.projection_ids.clone()
        }
    }

    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        self.output_positions()
            .into_iter()
            .map(|position| ColumnBinding::new(self.table_index, position))
            .collect()
    }

    /// Type of the column at `position` in `column_ids`.
    pub fn column_type(&self, position: usize) -> Option<LogicalType> {
        let column_id = *self.column_ids.get(position)?;
        self.returned_types.get(column_id).copied()
    }

    pub fn types(&self) -> Vec<LogicalType> {
        self.output_positions()
            .into_iter()
            .filter_map(|position| self.column_type(position))
            .collect()
    }
}

impl PartialEq for LogicalGet {
    fn eq(&self, other: &Self) -> bool {
        self.table_index == other.table_index
            && Arc::ptr_eq(&self.table, &other.table)
            && self.function == other.function
            && self.column_ids == other.column_ids
            && self.projection_ids == other.projection_ids
            && self.returned_types == other.returned_types
            && self.table_filters == other.table_filters
            && self.dynamic_filters == other.dynamic_filters
            && self.estimated_cardinality == other.estimated_cardinality
    }
}

/// Row filter. Every expression must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalFilter {
    pub expressions: Vec<Expression>,
    /// Positions of the child's output to emit; empty emits all
    pub projection_map: Vec<usize>,
}

impl LogicalFilter {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self {
            expressions,
            projection_map: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalProjection {
    pub table_index: usize,
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalLimit {
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    Get(LogicalGet),
    Filter(LogicalFilter),
    Projection(LogicalProjection),
    Limit(LogicalLimit),
    CrossProduct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOperator {
    pub kind: OperatorKind,
    pub children: Vec<LogicalOperator>,
}

impl LogicalOperator {
    pub fn get(get: LogicalGet) -> Self {
        Self {
            kind: OperatorKind::Get(get),
            children: Vec::new(),
        }
    }

    pub fn filter(filter: LogicalFilter, child: LogicalOperator) -> Self {
        Self {
            kind: OperatorKind::Filter(filter),
            children: vec![child],
        }
    }

    pub fn projection(table_index: usize, expressions: Vec<Expression>, child: LogicalOperator) -> Self {
        Self {
            kind: OperatorKind::Projection(LogicalProjection {
                table_index,
                expressions,
            }),
            children: vec![child],
        }
    }

    pub fn limit(limit: u64, offset: u64, child: LogicalOperator) -> Self {
        Self {
            kind: OperatorKind::Limit(LogicalLimit { limit, offset }),
            children: vec![child],
        }
    }

    pub fn cross_product(left: LogicalOperator, right: LogicalOperator) -> Self {
        Self {
            kind: OperatorKind::CrossProduct,
            children: vec![left, right],
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            OperatorKind::Get(get) if get.function.index_scan().is_some() => "RTREE_INDEX_SCAN",
            OperatorKind::Get(_) => "SEQ_SCAN",
            OperatorKind::Filter(_) => "FILTER",
            OperatorKind::Projection(_) => "PROJECTION",
            OperatorKind::Limit(_) => "LIMIT",
            OperatorKind::CrossProduct => "CROSS_PRODUCT",
        }
    }

    pub fn as_get(&self) -> Option<&LogicalGet> {
        match &self.kind {
            OperatorKind::Get(get) => Some(get),
            _ => None,
        }
    }

    pub fn as_get_mut(&mut self) -> Option<&mut LogicalGet> {
        match &mut self.kind {
            OperatorKind::Get(get) => Some(get),
            _ => None,
        }
    }

    pub fn as_filter(&self) -> Option<&LogicalFilter> {
        match &self.kind {
            OperatorKind::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        match &self.kind {
            OperatorKind::Get(get) => get.column_bindings(),
            OperatorKind::Filter(filter) => {
                let bindings = self.child_bindings(0);
                if filter.projection_map.is_empty() {
                    bindings
                } else {
                    filter
                        .projection_map
                        .iter()
                        .filter_map(|&i| bindings.get(i).copied())
                        .collect()
                }
            }
            OperatorKind::Projection(projection) => (0..projection.expressions.len())
                .map(|i| ColumnBinding::new(projection.table_index, i))
                .collect(),
            OperatorKind::Limit(_) => self.child_bindings(0),
            OperatorKind::CrossProduct => self
                .children
                .iter()
                .flat_map(LogicalOperator::column_bindings)
                .collect(),
        }
    }

    fn child_bindings(&self, i: usize) -> Vec<ColumnBinding> {
        self.children
            .get(i)
            .map(LogicalOperator::column_bindings)
            .unwrap_or_default()
    }

    /// Depth-first, parent-first walk.
    pub fn visit(&self, f: &mut dyn FnMut(&LogicalOperator)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Every scan in the plan.
    pub fn gets(&self) -> Vec<&LogicalGet> {
        let mut gets = Vec::new();
        self.collect_gets(&mut gets);
        gets
    }

    fn collect_gets<'a>(&'a self, out: &mut Vec<&'a LogicalGet>) {
        if let Some(get) = self.as_get() {
            out.push(get);
        }
        for child in &self.children {
            child.collect_gets(out);
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.name(), indent = depth * 2)?;
        match &self.kind {
            OperatorKind::Get(get) => {
                write!(f, " {}", get.table.name())?;
                if let Some(bind) = get.function.index_scan() {
                    write!(f, " index={} bbox={}", bind.index.name(), bind.bbox)?;
                }
                for (column_id, filter) in &get.table_filters {
                    let name = get
                        .table
                        .column(*column_id)
                        .map(|column| column.name.as_str())
                        .unwrap_or("?");
                    write!(f, " [{}: {}]", name, filter)?;
                }
                write!(f, " ~{}", get.estimated_cardinality)?;
            }
            OperatorKind::Filter(filter) => {
                for expr in &filter.expressions {
                    write!(f, " {}", expr)?;
                }
            }
            OperatorKind::Projection(projection) => {
                for expr in &projection.expressions {
                    write!(f, " {}", expr)?;
                }
            }
            OperatorKind::Limit(limit) => {
                write!(f, " {}", limit.limit)?;
                if limit.offset > 0 {
                    write!(f, " OFFSET {}", limit.offset)?;
                }
            }
            OperatorKind::CrossProduct => {}
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
