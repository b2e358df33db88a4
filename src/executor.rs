//! Row-at-a-time expression evaluation.
//!
//! Evaluates index key expressions during CREATE INDEX and residual filter
//! predicates over fetched rows. Both [`Expression::ColumnRef`] and
//! [`Expression::Reference`] resolve against the row by position: the
//! binding's column index for the former, the reference index for the latter.

use crate::error::{GeoscanError, Result};
use crate::expression::{ConjunctionOp, Expression};
use crate::function::FunctionRegistry;
use crate::types::Value;

pub struct ExpressionExecutor<'a> {
    registry: &'a FunctionRegistry,
}

impl<'a> ExpressionExecutor<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self { registry }
    }

    pub fn evaluate(&self, expr: &Expression, row: &[Value]) -> Result<Value> {
        match expr {
            Expression::ColumnRef { binding, .. } => column_value(row, binding.column_index),
            Expression::Reference { index, .. } => column_value(row, *index),
            Expression::Constant { value, .. } => Ok(value.clone()),
            Expression::Function { function, children } => {
                let args = children
                    .iter()
                    .map(|child| self.evaluate(child, row))
                    .collect::<Result<Vec<_>>>()?;
                self.registry.invoke(&function.name, &args)
            }
            Expression::Comparison { op, left, right } => {
                let left = self.evaluate(left, row)?;
                let right = self.evaluate(right, row)?;
                if left.is_null() || right.is_null() {
                    return Ok(Value::Null);
                }
                let ordering = left.compare(&right).ok_or_else(|| {
                    GeoscanError::Evaluation(format!("Cannot compare {} with {}", left, right))
                })?;
                Ok(Value::Boolean(op.holds(ordering)))
            }
            Expression::Conjunction { op, children } => self.evaluate_conjunction(*op, children, row),
            Expression::Not(child) => match self.evaluate(child, row)? {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                other => Err(GeoscanError::Evaluation(format!(
                    "NOT expects a BOOLEAN, got {}",
                    other
                ))),
            },
            Expression::IsNull(child) => Ok(Value::Boolean(self.evaluate(child, row)?.is_null())),
            Expression::IsNotNull(child) => {
                Ok(Value::Boolean(!self.evaluate(child, row)?.is_null()))
            }
        }
    }

    /// Evaluate a filter predicate; NULL counts as false.
    pub fn evaluate_predicate(&self, expr: &Expression, row: &[Value]) -> Result<bool> {
        match self.evaluate(expr, row)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(GeoscanError::Evaluation(format!(
                "Filter predicate must be BOOLEAN, got {}",
                other
            ))),
        }
    }

    /// Three-valued AND/OR with short-circuiting.
    fn evaluate_conjunction(
        &self,
        op: ConjunctionOp,
        children: &[Expression],
        row: &[Value],
    ) -> Result<Value> {
        let short_circuit = matches!(op, ConjunctionOp::Or);
        let mut saw_null = false;
        for child in children {
            match self.evaluate(child, row)? {
                Value::Boolean(b) if b == short_circuit => return Ok(Value::Boolean(b)),
                Value::Boolean(_) => {}
                Value::Null => saw_null = true,
                other => {
                    return Err(GeoscanError::Evaluation(format!(
                        "Conjunction operands must be BOOLEAN, got {}",
                        other
                    )));
                }
            }
        }
        if saw_null {
            Ok(Value::Null)
        } else {
            Ok(Value::Boolean(!short_circuit))
        }
    }
}

fn column_value(row: &[Value], index: usize) -> Result<Value> {
    row.get(index).cloned().ok_or_else(|| {
        GeoscanError::Evaluation(format!(
            "Column index {} out of range for row of width {}",
            index,
            row.len()
        ))
    })
}
