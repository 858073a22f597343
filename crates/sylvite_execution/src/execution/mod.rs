pub mod operators;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ExecutionError, Result};

/// Per-query execution state shared by all operators of a plan.
///
/// Carries the cooperative cancellation flag: operators consult it between
/// chunks and produce either a complete result or no result at all. Timeouts
/// are enforced by the caller through the same flag.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancel: Arc<AtomicBool>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the query.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn check_canceled(&self) -> Result<()> {
        if self.is_canceled() {
            Err(ExecutionError::QueryCanceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_sticky() {
        let ctx = ExecutionContext::new();
        ctx.check_canceled().unwrap();

        ctx.cancel();
        assert!(ctx.is_canceled());
        ctx.check_canceled().unwrap_err();

        // Clones observe the same flag.
        ctx.clone().check_canceled().unwrap_err();
    }
}
