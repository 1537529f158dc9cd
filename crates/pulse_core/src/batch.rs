/// Outcome of one bounded confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Proceed,
    Abort,
    /// No signal arrived before the deadline; the pipeline moves on.
    TimeoutAutoProceed,
}

/// Which kind of queue pass is running.
///
/// The first pass clears every sync mark before selection; the retry pass
/// must not, or it would erase the failed marks it selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    First,
    Retry,
}

/// Counts for one completed (or cut short) queue pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchResult {
    /// Targets that ran to completion without failure, including those that
    /// yielded no fragments.
    pub processed: usize,
    /// Targets marked failed during this pass.
    pub failed: usize,
    /// Raw records committed during this pass.
    pub records: usize,
    /// The pass stopped early because the cancel flag was set.
    pub aborted: bool,
}

impl BatchResult {
    pub fn attempted(&self) -> usize {
        self.processed + self.failed
    }
}

/// The two out-parameters returned by the downstream finalize procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReply {
    pub code: i64,
    pub message: String,
}

/// What happened when the finalize procedure was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Completed(FinalizeReply),
    Failed(String),
}

/// Process exit-status contract for a full pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Completed,
    /// A human abort signal stopped the batch.
    Aborted,
    /// The fetch session became unusable.
    SessionLost,
    /// The target selector could not be resolved, so no pass started.
    SelectorFailed,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Completed => 0,
            ExitStatus::Aborted => 2,
            ExitStatus::SessionLost => 3,
            ExitStatus::SelectorFailed => 4,
        }
    }
}

/// Summary of a full run: both passes, the finalize outcome and the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub first_pass: Option<BatchResult>,
    pub retry_pass: Option<BatchResult>,
    pub finalize: Option<FinalizeOutcome>,
    pub status: ExitStatus,
}

impl PipelineReport {
    /// Targets the retry pass attempted, zero when no retry ran.
    pub fn retried(&self) -> usize {
        self.retry_pass.map_or(0, |pass| pass.attempted())
    }
}
