//! Row-at-a-time interpreter for logical plans.
//!
//! Resolves column bindings to row positions and runs each operator over
//! fully materialized input. Enough to run rewritten plans end to end; not a
//! vectorized engine.

use super::operator::{LogicalGet, LogicalOperator, OperatorKind, ScanFunction};
use crate::error::{GeoscanError, Result};
use crate::executor::ExpressionExecutor;
use crate::expression::{ColumnBinding, Expression};
use crate::function::FunctionRegistry;
use crate::scan::IndexScan;
use crate::types::{RowId, Value};

pub type Row = Vec<Value>;

pub struct PlanExecutor<'a> {
    functions: &'a FunctionRegistry,
    batch_size: usize,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(functions: &'a FunctionRegistry, batch_size: usize) -> Self {
        Self {
            functions,
            batch_size,
        }
    }

    pub fn execute(&self, plan: &LogicalOperator) -> Result<Vec<Row>> {
        match &plan.kind {
            OperatorKind::Get(get) => self.execute_get(get),
            OperatorKind::Filter(filter) => {
                let child = only_child(plan)?;
                let bindings = child.column_bindings();
                let predicates = filter
                    .expressions
                    .iter()
                    .map(|expr| bind_expression(expr, &bindings))
                    .collect::<Result<Vec<_>>>()?;
                let executor = ExpressionExecutor::new(self.functions);

                let mut out = Vec::new();
                for row in self.execute(child)? {
                    let mut keep = true;
                    for predicate in &predicates {
                        if !executor.evaluate_predicate(predicate, &row)? {
                            keep = false;
                            break;
                        }
                    }
                    if keep {
                        out.push(project(row, &filter.projection_map));
                    }
                }
                Ok(out)
            }
            OperatorKind::Projection(projection) => {
                let child = only_child(plan)?;
                let bindings = child.column_bindings();
                let expressions = projection
                    .expressions
                    .iter()
                    .map(|expr| bind_expression(expr, &bindings))
                    .collect::<Result<Vec<_>>>()?;
                let executor = ExpressionExecutor::new(self.functions);
                self.execute(child)?
                    .iter()
                    .map(|row| {
                        expressions
                            .iter()
                            .map(|expr| executor.evaluate(expr, row))
                            .collect()
                    })
                    .collect()
            }
            OperatorKind::Limit(limit) => {
                let rows = self.execute(only_child(plan)?)?;
                Ok(rows
                    .into_iter()
                    .skip(limit.offset as usize)
                    .take(limit.limit as usize)
                    .collect())
            }
            OperatorKind::CrossProduct => {
                let [left, right] = plan.children.as_slice() else {
                    return Err(GeoscanError::Internal(
                        "Cross product needs exactly two children".to_string(),
                    ));
                };
                let left = self.execute(left)?;
                let right = self.execute(right)?;
                let mut out = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        out.push(l.iter().chain(r).cloned().collect());
                    }
                }
                Ok(out)
            }
        }
    }

    /// Rows of a scan with their row ids, before projection.
    fn scan_rows(&self, get: &LogicalGet) -> Result<Vec<(RowId, Row)>> {
        match &get.function {
            ScanFunction::SeqScan => {
                let mut rows = Vec::new();
                get.table
                    .storage()
                    .scan(&get.column_ids, &mut |row_id, row| {
                        rows.push((row_id, row));
                        Ok(())
                    })?;
                Ok(rows)
            }
            ScanFunction::RTreeIndexScan(bind) => {
                IndexScan::new(bind, &get.column_ids, self.batch_size)?.collect_rows()
            }
        }
    }

    fn execute_get(&self, get: &LogicalGet) -> Result<Vec<Row>> {
        let executor = ExpressionExecutor::new(self.functions);

        let mut predicates = Vec::with_capacity(get.table_filters.len());
        for (&column_id, filter) in &get.table_filters {
            let position = get
                .column_ids
                .iter()
                .position(|&id| id == column_id)
                .ok_or_else(|| {
                    GeoscanError::Internal(format!(
                        "Filter column {} is not scanned from {}",
                        column_id,
                        get.table.name()
                    ))
                })?;
            let return_type = get
                .column_type(position)
                .ok_or_else(|| GeoscanError::Internal(format!("Unknown column {}", column_id)))?;
            predicates.push(filter.to_expression(&Expression::reference(position, return_type)));
        }
        let all_positions: Vec<ColumnBinding> = (0..get.column_ids.len())
            .map(|i| ColumnBinding::new(get.table_index, i))
            .collect();
        for expr in &get.dynamic_filters {
            predicates.push(bind_expression(expr, &all_positions)?);
        }

        let mut out = Vec::new();
        for (_, row) in self.scan_rows(get)? {
            let mut keep = true;
            for predicate in &predicates {
                if !executor.evaluate_predicate(predicate, &row)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                out.push(project(row, &get.projection_ids));
            }
        }
        Ok(out)
    }
}

fn only_child(plan: &LogicalOperator) -> Result<&LogicalOperator> {
    match plan.children.as_slice() {
        [child] => Ok(child),
        children => Err(GeoscanError::Internal(format!(
            "{} expects one child, found {}",
            plan.name(),
            children.len()
        ))),
    }
}

fn project(row: Row, positions: &[usize]) -> Row {
    if positions.is_empty() {
        row
    } else {
        positions
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Replace column references with positions in `bindings`.
pub fn bind_expression(expr: &Expression, bindings: &[ColumnBinding]) -> Result<Expression> {
    if let Expression::ColumnRef {
        binding,
        return_type,
    } = expr
    {
        let position = bindings.iter().position(|b| b == binding).ok_or_else(|| {
            GeoscanError::Internal(format!(
                "Column binding #[{}.{}] not produced by child operator",
                binding.table_index, binding.column_index
            ))
        })?;
        return Ok(Expression::reference(position, *return_type));
    }

    let mut bound = expr.clone();
    for (slot, child) in bound.children_mut().into_iter().zip(expr.children()) {
        *slot = bind_expression(child, bindings)?;
    }
    Ok(bound)
}
