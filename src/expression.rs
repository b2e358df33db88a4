//! Bound expression trees.
//!
//! Expressions reference data in one of two ways:
//! - [`Expression::ColumnRef`] names a column through a [`ColumnBinding`]
//!   (the producing operator's table index plus the column's position in
//!   that operator's output). Used in logical plans.
//! - [`Expression::Reference`] names a position in the row being evaluated
//!   directly. Used inside pushed-down table filters, where the filtered
//!   column is always position 0.

use crate::function::ScalarFunction;
use crate::types::{LogicalType, Value};
use std::fmt;

/// Identifies one output column of a plan operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnBinding {
    pub table_index: usize,
    pub column_index: usize,
}

impl ColumnBinding {
    pub const fn new(table_index: usize, column_index: usize) -> Self {
        Self {
            table_index,
            column_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "!=",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEqual => ">=",
        }
    }

    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Equal => ordering == Equal,
            CompareOp::NotEqual => ordering != Equal,
            CompareOp::LessThan => ordering == Less,
            CompareOp::LessThanOrEqual => ordering != Greater,
            CompareOp::GreaterThan => ordering == Greater,
            CompareOp::GreaterThanOrEqual => ordering != Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConjunctionOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ColumnRef {
        binding: ColumnBinding,
        return_type: LogicalType,
    },
    Reference {
        index: usize,
        return_type: LogicalType,
    },
    Constant {
        value: Value,
        return_type: LogicalType,
    },
    Function {
        function: ScalarFunction,
        children: Vec<Expression>,
    },
    Comparison {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Conjunction {
        op: ConjunctionOp,
        children: Vec<Expression>,
    },
    Not(Box<Expression>),
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
}

impl Expression {
    pub fn column(binding: ColumnBinding, return_type: LogicalType) -> Self {
        Expression::ColumnRef {
            binding,
            return_type,
        }
    }

    pub fn reference(index: usize, return_type: LogicalType) -> Self {
        Expression::Reference { index, return_type }
    }

    /// A typed constant. The type of a non-NULL value is taken from the value.
    pub fn constant(value: Value) -> Self {
        let return_type = value.logical_type().unwrap_or(LogicalType::BigInt);
        Expression::Constant { value, return_type }
    }

    pub fn typed_null(return_type: LogicalType) -> Self {
        Expression::Constant {
            value: Value::Null,
            return_type,
        }
    }

    pub fn function(function: ScalarFunction, children: Vec<Expression>) -> Self {
        Expression::Function { function, children }
    }

    pub fn comparison(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(children: Vec<Expression>) -> Self {
        Expression::Conjunction {
            op: ConjunctionOp::And,
            children,
        }
    }

    pub fn return_type(&self) -> LogicalType {
        match self {
            Expression::ColumnRef { return_type, .. }
            | Expression::Reference { return_type, .. }
            | Expression::Constant { return_type, .. } => *return_type,
            Expression::Function { function, .. } => function.return_type,
            Expression::Comparison { .. }
            | Expression::Conjunction { .. }
            | Expression::Not(_)
            | Expression::IsNull(_)
            | Expression::IsNotNull(_) => LogicalType::Boolean,
        }
    }

    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::ColumnRef { .. }
            | Expression::Reference { .. }
            | Expression::Constant { .. } => Vec::new(),
            Expression::Function { children, .. } | Expression::Conjunction { children, .. } => {
                children.iter().collect()
            }
            Expression::Comparison { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expression::Not(child) | Expression::IsNull(child) | Expression::IsNotNull(child) => {
                vec![child.as_ref()]
            }
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Expression::ColumnRef { .. }
            | Expression::Reference { .. }
            | Expression::Constant { .. } => Vec::new(),
            Expression::Function { children, .. } | Expression::Conjunction { children, .. } => {
                children.iter_mut().collect()
            }
            Expression::Comparison { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expression::Not(child) | Expression::IsNull(child) | Expression::IsNotNull(child) => {
                vec![child.as_mut()]
            }
        }
    }

    /// Whether the expression and all of its descendants are free of
    /// side-effecting functions, i.e. evaluating it twice on the same row
    /// gives the same result.
    pub fn is_consistent(&self) -> bool {
        if let Expression::Function { function, .. } = self
            && function.has_side_effects()
        {
            return false;
        }
        self.children().into_iter().all(Expression::is_consistent)
    }

    /// Whether the expression can be evaluated at plan time: it reads no
    /// columns and calls no side-effecting functions.
    pub fn is_foldable(&self) -> bool {
        match self {
            Expression::ColumnRef { .. } | Expression::Reference { .. } => false,
            Expression::Constant { .. } => true,
            Expression::Function { function, children } => {
                !function.has_side_effects() && children.iter().all(Expression::is_foldable)
            }
            _ => self.children().into_iter().all(Expression::is_foldable),
        }
    }

    /// Every column binding referenced anywhere in the expression.
    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        let mut bindings = Vec::new();
        self.collect_bindings(&mut bindings);
        bindings
    }

    fn collect_bindings(&self, out: &mut Vec<ColumnBinding>) {
        if let Expression::ColumnRef { binding, .. } = self {
            out.push(*binding);
        }
        for child in self.children() {
            child.collect_bindings(out);
        }
    }

    /// Replace every [`Expression::Reference`] to `index` with `replacement`.
    pub fn replace_reference(&mut self, index: usize, replacement: &Expression) {
        if let Expression::Reference { index: current, .. } = self
            && *current == index
        {
            *self = replacement.clone();
            return;
        }
        for child in self.children_mut() {
            child.replace_reference(index, replacement);
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::ColumnRef { binding, .. } => {
                write!(f, "#[{}.{}]", binding.table_index, binding.column_index)
            }
            Expression::Reference { index, .. } => write!(f, "#{}", index),
            Expression::Constant { value, .. } => write!(f, "{}", value),
            Expression::Function { function, children } => {
                write!(f, "{}(", function.name)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Expression::Comparison { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Conjunction { op, children } => {
                let separator = match op {
                    ConjunctionOp::And => " AND ",
                    ConjunctionOp::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(separator)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Expression::Not(child) => write!(f, "(NOT {})", child),
            Expression::IsNull(child) => write!(f, "({} IS NULL)", child),
            Expression::IsNotNull(child) => write!(f, "({} IS NOT NULL)", child),
        }
    }
}
