use std::sync::Arc;

use pipeline_logging::{pipeline_info, pipeline_warn};
use pulse_core::BatchResult;

use crate::queue::PassError;
use crate::store::Store;

/// Decides whether the single retry pass is worth running.
///
/// At most one retry per process run; a bounded second pass avoids spinning
/// on systemically broken targets.
pub struct RetryScheduler {
    store: Arc<dyn Store>,
}

impl RetryScheduler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Queries the failed count and, when nonzero, runs one retry pass via
    /// the supplied runner. Returns `None` when no retry ran.
    pub fn run_retry_pass<F>(&self, run_pass: F) -> Option<Result<BatchResult, PassError>>
    where
        F: FnOnce() -> Result<BatchResult, PassError>,
    {
        let failed = match self.store.failed_count() {
            Ok(count) => count,
            Err(err) => {
                pipeline_warn!("failed-count query skipped, no retry: {err}");
                return None;
            }
        };
        if failed == 0 {
            pipeline_info!("no failed targets, retry pass skipped");
            return None;
        }
        pipeline_info!("retrying {failed} failed target(s)");
        Some(run_pass())
    }
}
