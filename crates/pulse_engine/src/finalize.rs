use std::sync::{Arc, Mutex};

use pipeline_logging::{pipeline_error, pipeline_info};
use pulse_core::FinalizeOutcome;

use crate::store::Store;

/// Invokes the downstream finalize procedure exactly once per run.
///
/// Failures are logged, never retried, and reverse nothing that was already
/// committed.
pub struct Finalizer {
    store: Arc<dyn Store>,
    outcome: Mutex<Option<FinalizeOutcome>>,
}

impl Finalizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            outcome: Mutex::new(None),
        }
    }

    /// Runs the procedure on first call; later calls return the recorded
    /// outcome without invoking it again.
    pub fn finalize(&self) -> FinalizeOutcome {
        let mut recorded = match self.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(outcome) = recorded.as_ref() {
            return outcome.clone();
        }

        let outcome = match self.store.call_finalize_procedure() {
            Ok(reply) => {
                pipeline_info!(
                    "finalize procedure done: code={} message={}",
                    reply.code,
                    reply.message
                );
                FinalizeOutcome::Completed(reply)
            }
            Err(err) => {
                pipeline_error!("finalize procedure failed: {err}");
                FinalizeOutcome::Failed(err.to_string())
            }
        };
        *recorded = Some(outcome.clone());
        outcome
    }

    /// Scoped guarantee that finalize runs even on an unwind path.
    pub fn guard(self: &Arc<Self>) -> FinalizeGuard {
        FinalizeGuard {
            finalizer: Arc::clone(self),
        }
    }
}

/// Runs finalize when dropped. The pipeline's explicit call records the
/// outcome first, making the drop a no-op on the normal path.
pub struct FinalizeGuard {
    finalizer: Arc<Finalizer>,
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        let _ = self.finalizer.finalize();
    }
}
