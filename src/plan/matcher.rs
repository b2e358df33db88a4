//! Recognizes spatial predicates an R-tree scan can serve.
//!
//! A predicate matches when it is a call to one of the [`SpatialRelation`]
//! functions with signature `GEOMETRY x GEOMETRY -> BOOLEAN`, one argument
//! is the index key (after it has been rewritten to the scan's columns) and
//! the other is foldable. Argument order does not matter.

use crate::expression::Expression;
use crate::function::SpatialRelation;
use crate::types::LogicalType;

/// A predicate that passed [`SpatialPredicateMatcher::matches`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateMatch<'a> {
    pub relation: SpatialRelation,
    /// Argument position (0 or 1) holding the index key
    pub key_position: usize,
    /// The foldable operand
    pub constant: &'a Expression,
}

pub struct SpatialPredicateMatcher<'k> {
    key: &'k Expression,
}

impl<'k> SpatialPredicateMatcher<'k> {
    pub fn new(key: &'k Expression) -> Self {
        Self { key }
    }

    pub fn matches<'e>(&self, predicate: &'e Expression) -> Option<PredicateMatch<'e>> {
        let Expression::Function { function, children } = predicate else {
            return None;
        };
        let relation = SpatialRelation::resolve(&function.name)?;
        if function.has_side_effects()
            || function.return_type != LogicalType::Boolean
            || function.arguments != [LogicalType::Geometry, LogicalType::Geometry]
        {
            return None;
        }
        let [left, right] = children.as_slice() else {
            return None;
        };
        if left.return_type() != LogicalType::Geometry
            || right.return_type() != LogicalType::Geometry
        {
            return None;
        }

        // Unordered: try (key, constant) then (constant, key).
        [(0, left, right), (1, right, left)]
            .into_iter()
            .find(|(_, key, constant)| *key == self.key && constant.is_foldable())
            .map(|(key_position, _, constant)| PredicateMatch {
                relation,
                key_position,
                constant,
            })
    }
}
