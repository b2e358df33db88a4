//! Filters pushed down into a table scan.
//!
//! A table filter applies to a single column of the scan. When the
//! predicate is an arbitrary expression, it refers to that column as
//! [`Expression::Reference`] 0.

use crate::expression::{CompareOp, Expression};
use crate::types::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionFilter {
    pub expr: Expression,
}

impl ExpressionFilter {
    pub fn new(expr: Expression) -> Self {
        Self { expr }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFilter {
    /// `column <op> constant`
    ConstantComparison { op: CompareOp, constant: Value },
    IsNull,
    IsNotNull,
    /// All child filters must hold
    And(Vec<TableFilter>),
    Expression(ExpressionFilter),
}

impl TableFilter {
    pub fn comparison(op: CompareOp, constant: impl Into<Value>) -> Self {
        TableFilter::ConstantComparison {
            op,
            constant: constant.into(),
        }
    }

    pub fn expression(expr: Expression) -> Self {
        TableFilter::Expression(ExpressionFilter::new(expr))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, TableFilter::Expression(_))
    }

    /// The filter as a standalone predicate over `column`.
    pub fn to_expression(&self, column: &Expression) -> Expression {
        match self {
            TableFilter::ConstantComparison { op, constant } => Expression::comparison(
                *op,
                column.clone(),
                Expression::constant(constant.clone()),
            ),
            TableFilter::IsNull => Expression::IsNull(Box::new(column.clone())),
            TableFilter::IsNotNull => Expression::IsNotNull(Box::new(column.clone())),
            TableFilter::And(children) => Expression::and(
                children
                    .iter()
                    .map(|child| child.to_expression(column))
                    .collect(),
            ),
            TableFilter::Expression(filter) => {
                let mut expr = filter.expr.clone();
                expr.replace_reference(0, column);
                expr
            }
        }
    }
}

impl fmt::Display for TableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFilter::ConstantComparison { op, constant } => {
                write!(f, "{} {}", op.symbol(), constant)
            }
            TableFilter::IsNull => f.write_str("IS NULL"),
            TableFilter::IsNotNull => f.write_str("IS NOT NULL"),
            TableFilter::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
            TableFilter::Expression(filter) => write!(f, "{}", filter.expr),
        }
    }
}
