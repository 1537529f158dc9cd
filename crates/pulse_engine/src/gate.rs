use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use pipeline_logging::pipeline_info;
use pulse_core::{CancelFlag, ConfirmationOutcome};

/// Human input consumed by the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanSignal {
    Proceed,
    Abort,
}

/// Bounded wait for human confirmation before a target is extracted.
///
/// Absence of input is not a failure: with no signal before the deadline the
/// gate auto-resolves to proceed. An abort signal additionally raises the
/// shared cancel flag so the queue stops after the current target.
pub struct ConfirmationGate {
    signals: Receiver<HumanSignal>,
    poll_interval: Duration,
    cancel: CancelFlag,
}

impl ConfirmationGate {
    pub fn new(signals: Receiver<HumanSignal>, poll_interval: Duration, cancel: CancelFlag) -> Self {
        Self {
            signals,
            poll_interval,
            cancel,
        }
    }

    /// Blocks until a signal arrives or the timeout elapses, waking at most
    /// one poll interval past the deadline. Signals queue up: input typed
    /// ahead of the wait still counts.
    pub fn wait(&self, timeout: Duration) -> ConfirmationOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                pipeline_info!("no confirmation within {:?}, proceeding", timeout);
                return ConfirmationOutcome::TimeoutAutoProceed;
            }
            let slice = self.poll_interval.min(deadline - now);
            match self.signals.recv_timeout(slice) {
                Ok(HumanSignal::Proceed) => return ConfirmationOutcome::Proceed,
                Ok(HumanSignal::Abort) => {
                    self.cancel.cancel();
                    return ConfirmationOutcome::Abort;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Signal source is gone; honor the deadline, then the
                    // default-accept policy applies.
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    std::thread::sleep(remaining);
                    return ConfirmationOutcome::TimeoutAutoProceed;
                }
            }
        }
    }
}
