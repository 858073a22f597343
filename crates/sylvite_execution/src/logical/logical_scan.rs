use crate::explain::{ExplainConfig, ExplainEntry, Explainable};

/// Scan of a stored table, identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalScan {
    pub table_name: String,
}

impl Explainable for LogicalScan {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Scan").with_value("table", &self.table_name)
    }
}
