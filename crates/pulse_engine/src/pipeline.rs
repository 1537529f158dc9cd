use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pipeline_logging::{pipeline_error, pipeline_info};
use pulse_core::{
    BatchResult, CancelFlag, ExitStatus, PassKind, PipelineReport, TargetSelector,
};

use crate::extract::FragmentExtractor;
use crate::fetch::SessionFetcher;
use crate::finalize::Finalizer;
use crate::gate::{ConfirmationGate, HumanSignal};
use crate::queue::{Clock, PassError, WorkQueue};
use crate::retry::RetryScheduler;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub entry_url: String,
    pub confirmation_enabled: bool,
    pub confirm_timeout: Duration,
    pub gate_poll_interval: Duration,
}

impl PipelineSettings {
    pub fn new(entry_url: impl Into<String>) -> Self {
        Self {
            entry_url: entry_url.into(),
            confirmation_enabled: false,
            confirm_timeout: Duration::from_secs(5),
            gate_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Owns the collaborators for one process run and sequences the passes.
pub struct Pipeline {
    store: Arc<dyn Store>,
    fetcher: Box<dyn SessionFetcher>,
    extractor: Box<dyn FragmentExtractor>,
    gate: Option<ConfirmationGate>,
    cancel: CancelFlag,
    settings: PipelineSettings,
    now: Clock,
    batch_seq: u32,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Box<dyn SessionFetcher>,
        extractor: Box<dyn FragmentExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            gate: None,
            cancel: CancelFlag::new(),
            settings,
            now: Arc::new(Utc::now),
            batch_seq: 0,
        }
    }

    /// Attaches the human signal stream feeding the confirmation gate.
    pub fn with_signals(mut self, signals: Receiver<HumanSignal>) -> Self {
        self.gate = Some(ConfirmationGate::new(
            signals,
            self.settings.gate_poll_interval,
            self.cancel.clone(),
        ));
        self
    }

    pub fn with_clock(mut self, now: Clock) -> Self {
        self.now = now;
        self
    }

    /// Handle to the process-wide cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs one queue pass under a fresh batch sequence number.
    ///
    /// The due-selector variant is a first pass and resets sync marks; the
    /// failed-selector variant is a retry pass and must not.
    pub fn run_ingestion_batch(
        &mut self,
        selector: &TargetSelector,
        confirmation_enabled: bool,
        timeout: Duration,
    ) -> Result<BatchResult, PassError> {
        self.batch_seq += 1;
        let pass = match selector {
            TargetSelector::Due { .. } => PassKind::First,
            TargetSelector::Failed => PassKind::Retry,
        };

        let mut queue = WorkQueue::new(
            self.store.as_ref(),
            self.fetcher.as_mut(),
            self.extractor.as_ref(),
            self.cancel.clone(),
            self.now.clone(),
        );
        if confirmation_enabled {
            if let Some(gate) = self.gate.as_ref() {
                queue = queue.with_gate(gate, timeout);
            }
        }
        queue.run(selector, pass, self.batch_seq)
    }

    /// Sequences first pass, retry pass and finalize, closing the fetch
    /// session on every exit path before the finalizer runs.
    pub fn run_full_pipeline(&mut self) -> PipelineReport {
        let finalizer = Arc::new(Finalizer::new(self.store.clone()));
        let _unwind_guard = finalizer.guard();

        let (first_pass, retry_pass, status) = self.run_passes();
        self.fetcher.close();

        let finalize = finalizer.finalize();
        let report = PipelineReport {
            first_pass,
            retry_pass,
            finalize: Some(finalize),
            status,
        };
        let totals = report.first_pass.unwrap_or_default();
        pipeline_info!(
            "run finished: status={:?} processed={} failed={} retried={}",
            report.status,
            totals.processed,
            totals.failed,
            report.retried()
        );
        report
    }

    fn run_passes(&mut self) -> (Option<BatchResult>, Option<BatchResult>, ExitStatus) {
        if let Err(err) = self.fetcher.open(&self.settings.entry_url) {
            pipeline_error!("could not open fetch session: {err}");
            return (None, None, ExitStatus::SessionLost);
        }

        let today = (self.now)().date_naive();
        let confirmation = self.settings.confirmation_enabled;
        let timeout = self.settings.confirm_timeout;

        let mut status = ExitStatus::Completed;
        let first = match self.run_ingestion_batch(
            &TargetSelector::Due { today },
            confirmation,
            timeout,
        ) {
            Ok(result) => {
                if result.aborted {
                    status = ExitStatus::Aborted;
                }
                Some(result)
            }
            Err(PassError::Selector { source }) => {
                pipeline_error!("first pass could not start: {source}");
                return (None, None, ExitStatus::SelectorFailed);
            }
            Err(PassError::SessionLost { partial, source }) => {
                pipeline_error!("first pass lost the fetch session: {source}");
                status = ExitStatus::SessionLost;
                Some(partial)
            }
        };

        // The retry decision still runs after an abort or a session loss;
        // the queue observes the flag (or the dead session) and ends fast.
        let scheduler = RetryScheduler::new(self.store.clone());
        let retry = match scheduler.run_retry_pass(|| {
            self.run_ingestion_batch(&TargetSelector::Failed, confirmation, timeout)
        }) {
            None => None,
            Some(Ok(result)) => Some(result),
            Some(Err(PassError::Selector { source })) => {
                pipeline_error!("retry pass could not start: {source}");
                None
            }
            Some(Err(PassError::SessionLost { partial, source })) => {
                pipeline_error!("retry pass lost the fetch session: {source}");
                if status == ExitStatus::Completed {
                    status = ExitStatus::SessionLost;
                }
                Some(partial)
            }
        };

        (first, retry, status)
    }
}
