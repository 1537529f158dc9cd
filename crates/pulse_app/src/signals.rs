//! Stdin reader feeding confirmation signals to the gate.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use pipeline_logging::pipeline_info;
use pulse_engine::HumanSignal;

/// Spawns the stdin reader thread.
///
/// An empty line or `y` proceeds with the current target; `q` or `abort`
/// stops the run. The thread ends when stdin closes, after which the gate
/// falls back to its timeout policy.
pub fn spawn_stdin_signals() -> Receiver<HumanSignal> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let signal = match line.trim() {
                "" | "y" | "Y" => HumanSignal::Proceed,
                "q" | "Q" | "abort" => HumanSignal::Abort,
                other => {
                    pipeline_info!("ignoring input {other:?}");
                    continue;
                }
            };
            let stop = signal == HumanSignal::Abort;
            if tx.send(signal).is_err() || stop {
                break;
            }
        }
    });
    rx
}
