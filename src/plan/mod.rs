//! Logical plans and the index scan rewrite.

pub mod execute;
pub mod filter;
pub mod matcher;
pub mod operator;
pub mod optimizer;
pub mod rewrite;

pub use execute::PlanExecutor;
pub use filter::{ExpressionFilter, TableFilter};
pub use matcher::{PredicateMatch, SpatialPredicateMatcher};
pub use operator::{
    LogicalFilter, LogicalGet, LogicalLimit, LogicalOperator, LogicalProjection, OperatorKind,
    ScanFunction,
};
pub use optimizer::{OptimizerRule, PlannerContext};
pub use rewrite::RTreeIndexScanRule;
