use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pipeline_logging::{pipeline_error, pipeline_info, pipeline_warn};
use pulse_core::{
    BatchResult, CancelFlag, ConfirmationOutcome, PassKind, RawRecord, SyncMark, TargetSelector,
};

use crate::extract::{ExtractError, FragmentExtractor};
use crate::fetch::{FetchError, SessionFetcher};
use crate::gate::ConfirmationGate;
use crate::store::{Store, StoreError};

/// Injectable clock so tests control record timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Failure of one target's own processing step. Recovered locally: the
/// target is marked failed and the pass moves on.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("persist failed: {0}")]
    Persist(#[from] StoreError),
}

/// Failure that ends a whole pass instead of a single target.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("target selection failed: {source}")]
    Selector { source: StoreError },
    /// Counts accumulated before the session died travel with the error.
    #[error("fetch session lost: {source}")]
    SessionLost {
        partial: BatchResult,
        source: FetchError,
    },
}

enum ProcessOutcome {
    Stored(usize),
    Empty,
    GateAborted,
}

/// Sequentially processes the targets a selector resolves to.
///
/// Per-target failures never abort the batch; the cancel flag is honored
/// between targets; a session loss unwinds the rest of the pass.
pub struct WorkQueue<'a> {
    store: &'a dyn Store,
    fetcher: &'a mut dyn SessionFetcher,
    extractor: &'a dyn FragmentExtractor,
    gate: Option<&'a ConfirmationGate>,
    confirm_timeout: Duration,
    cancel: CancelFlag,
    now: Clock,
}

impl<'a> WorkQueue<'a> {
    pub fn new(
        store: &'a dyn Store,
        fetcher: &'a mut dyn SessionFetcher,
        extractor: &'a dyn FragmentExtractor,
        cancel: CancelFlag,
        now: Clock,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            gate: None,
            confirm_timeout: Duration::from_secs(5),
            cancel,
            now,
        }
    }

    /// Gates extraction of every target behind a timed confirmation.
    pub fn with_gate(mut self, gate: &'a ConfirmationGate, timeout: Duration) -> Self {
        self.gate = Some(gate);
        self.confirm_timeout = timeout;
        self
    }

    /// Runs one pass. Only the first pass clears sync marks before
    /// selection; a retry pass selects on the very marks a reset would erase.
    pub fn run(
        &mut self,
        selector: &TargetSelector,
        pass: PassKind,
        batch_seq: u32,
    ) -> Result<BatchResult, PassError> {
        if pass == PassKind::First {
            if let Err(err) = self.store.reset_sync_marks() {
                pipeline_warn!("sync mark reset skipped: {err}");
            }
        }

        let targets = self
            .store
            .query_targets(selector)
            .map_err(|source| PassError::Selector { source })?;
        pipeline_info!("{pass:?} pass selected {} target(s)", targets.len());

        let mut result = BatchResult::default();
        for target in &targets {
            if self.cancel.is_cancelled() {
                pipeline_info!(
                    "cancel flag set, stopping pass after {} target(s)",
                    result.attempted()
                );
                result.aborted = true;
                break;
            }

            self.mark(&target.name, Some(SyncMark::Pending));
            match self.process_target(&target.name, batch_seq) {
                Ok(ProcessOutcome::Stored(count)) => {
                    result.processed += 1;
                    result.records += count;
                    self.mark(&target.name, None);
                    pipeline_info!("{}: stored {count} record(s)", target.name);
                }
                Ok(ProcessOutcome::Empty) => {
                    result.processed += 1;
                    self.mark(&target.name, None);
                    pipeline_info!("{}: page had no usable fragments", target.name);
                }
                Ok(ProcessOutcome::GateAborted) => {
                    self.mark(&target.name, None);
                    result.aborted = true;
                    pipeline_info!("{}: abort signal during confirmation", target.name);
                    break;
                }
                Err(TargetError::Fetch(fetch_err)) if fetch_err.is_session_loss() => {
                    // The in-flight target keeps its pending mark; the next
                    // run's first pass resets it.
                    pipeline_error!("{}: {fetch_err}", target.name);
                    return Err(PassError::SessionLost {
                        partial: result,
                        source: fetch_err,
                    });
                }
                Err(err) => {
                    if let Err(rollback_err) = self.store.rollback() {
                        pipeline_warn!("{}: rollback skipped: {rollback_err}", target.name);
                    }
                    self.mark(&target.name, Some(SyncMark::Failed));
                    result.failed += 1;
                    pipeline_error!("{}: {err}", target.name);
                }
            }
        }

        Ok(result)
    }

    fn process_target(&mut self, name: &str, batch_seq: u32) -> Result<ProcessOutcome, TargetError> {
        let current_url = self.fetcher.search_and_navigate(name)?;
        pipeline_info!("{name}: extracting from {current_url}");
        let page = self.fetcher.current_page_content()?;

        if let Some(gate) = self.gate {
            match gate.wait(self.confirm_timeout) {
                ConfirmationOutcome::Abort => return Ok(ProcessOutcome::GateAborted),
                ConfirmationOutcome::Proceed | ConfirmationOutcome::TimeoutAutoProceed => {}
            }
        }

        let fragments = self.extractor.extract(&page)?;
        if fragments.is_empty() {
            return Ok(ProcessOutcome::Empty);
        }

        let created_at = (self.now)();
        let records: Vec<RawRecord> = fragments
            .into_iter()
            .map(|text| RawRecord {
                batch_seq,
                target_name: name.to_string(),
                text,
                created_at,
            })
            .collect();
        let count = records.len();

        self.store.insert_records(&records)?;
        if let Err(err) = self.store.update_last_update(name, created_at.date_naive()) {
            pipeline_warn!("{name}: last_update skipped: {err}");
        }
        self.store.commit()?;
        Ok(ProcessOutcome::Stored(count))
    }

    // Mark bookkeeping recovers at the operation boundary: a failed update
    // is logged and the pass continues.
    fn mark(&self, name: &str, mark: Option<SyncMark>) {
        if let Err(err) = self.store.set_sync_mark(name, mark) {
            pipeline_warn!("{name}: sync mark update skipped: {err}");
        }
    }
}
