use std::sync::Arc;

use sylvite_storage::table::Table;

use super::PhysicalOperator;
use crate::execution::ExecutionContext;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::errors::Result;

/// Leaf operator handing an existing table to the plan above it.
#[derive(Debug)]
pub struct TableSource {
    table: Arc<Table>,
}

impl TableSource {
    pub fn new(table: Arc<Table>) -> Self {
        TableSource { table }
    }
}

impl PhysicalOperator for TableSource {
    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        ctx.check_canceled()?;
        Ok(self.table.clone())
    }
}

impl Explainable for TableSource {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("TableSource").with_value("rows", self.table.row_count())
    }
}
