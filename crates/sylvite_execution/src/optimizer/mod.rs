pub mod between_composition;
pub mod like_rewrite;

use tracing::debug;

use crate::errors::Result;
use crate::expr::Expression;
use crate::logical::logical_show_tables::LogicalShowTables;
use crate::logical::operator::{LogicalOperator, Node};

use between_composition::BetweenComposition;
use like_rewrite::LikeRewrite;

pub trait OptimizeRule {
    /// Apply an optimization rule to the logical plan.
    ///
    /// Rules never fail a query: a shape a rule cannot handle is returned
    /// unchanged.
    fn optimize(&self, plan: LogicalOperator) -> Result<LogicalOperator>;
}

pub trait ExpressionRewriteRule {
    /// Rewrite a single expression.
    ///
    /// If the rewrite doesn't apply, then the expression should be returned
    /// unmodified.
    fn rewrite(expression: Expression) -> Result<Expression>;
}

#[derive(Debug)]
pub struct Optimizer {}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer {}
    }

    /// Run a logical plan through the optimizer.
    pub fn optimize(&self, plan: LogicalOperator) -> Result<LogicalOperator> {
        // Prefix LIKEs become range predicates first so that the between
        // composition can fuse them with any surrounding bounds.
        let plan = LikeRewrite.optimize(plan)?;
        debug!("applied like rewrite");

        let plan = BetweenComposition.optimize(plan)?;
        debug!("applied between composition");

        Ok(plan)
    }
}

/// Throwaway node for taking ownership of a child during a rewrite.
pub(crate) fn placeholder_operator() -> LogicalOperator {
    LogicalOperator::ShowTables(Node::new(LogicalShowTables))
}
