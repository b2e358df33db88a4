//! Planning context and its rule list.
//!
//! Rules are registered when a [`PlannerContext`] is constructed; there is
//! no process-wide hook registry.

use super::operator::LogicalOperator;
use super::rewrite::RTreeIndexScanRule;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;

/// A logical plan transformation.
pub trait OptimizerRule: Send + Sync {
    /// A human readable name for this rule
    fn name(&self) -> &str;

    /// Rewrite `plan` in place. A rule that finds nothing to do leaves the
    /// plan unchanged and returns `Ok(())`.
    fn optimize(&self, plan: &mut LogicalOperator) -> Result<()>;
}

pub struct PlannerContext {
    config: Config,
    rules: Vec<Box<dyn OptimizerRule>>,
}

impl PlannerContext {
    /// Context with the built-in rules enabled by the catalog's config.
    pub fn new(catalog: &Catalog) -> Self {
        let config = catalog.config().clone();
        let mut context = Self::empty(config);
        if context.config.enable_index_scan {
            context.add_rule(Box::new(RTreeIndexScanRule::new(catalog.functions().clone())));
        }
        context
    }

    /// Context without any rules.
    pub fn empty(config: Config) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn add_rule(&mut self, rule: Box<dyn OptimizerRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Apply every rule once, in registration order.
    pub fn optimize(&self, mut plan: LogicalOperator) -> Result<LogicalOperator> {
        for rule in &self.rules {
            rule.optimize(&mut plan)?;
            log::trace!("Plan after {}:\n{}", rule.name(), plan);
        }
        Ok(plan)
    }
}
