use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use pulse_core::{CancelFlag, ConfirmationOutcome};
use pulse_engine::{ConfirmationGate, HumanSignal};

fn gate_with_channel(
    poll_interval: Duration,
) -> (mpsc::Sender<HumanSignal>, ConfirmationGate, CancelFlag) {
    let cancel = CancelFlag::new();
    let (tx, rx) = mpsc::channel();
    let gate = ConfirmationGate::new(rx, poll_interval, cancel.clone());
    (tx, gate, cancel)
}

#[test]
fn timeout_auto_proceeds_within_one_poll_interval_of_deadline() {
    let timeout = Duration::from_millis(100);
    let poll = Duration::from_millis(20);
    let (_tx, gate, cancel) = gate_with_channel(poll);

    let start = Instant::now();
    let outcome = gate.wait(timeout);
    let elapsed = start.elapsed();

    assert_eq!(outcome, ConfirmationOutcome::TimeoutAutoProceed);
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_millis(300),
        "returned far past the deadline after {elapsed:?}"
    );
    assert!(!cancel.is_cancelled());
}

#[test]
fn proceed_signal_returns_immediately() {
    let (tx, gate, cancel) = gate_with_channel(Duration::from_millis(20));
    tx.send(HumanSignal::Proceed).unwrap();

    let start = Instant::now();
    let outcome = gate.wait(Duration::from_secs(5));

    assert_eq!(outcome, ConfirmationOutcome::Proceed);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!cancel.is_cancelled());
}

#[test]
fn abort_signal_raises_the_cancel_flag() {
    let (tx, gate, cancel) = gate_with_channel(Duration::from_millis(20));

    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        let _ = tx.send(HumanSignal::Abort);
    });

    let outcome = gate.wait(Duration::from_secs(5));
    sender.join().unwrap();

    assert_eq!(outcome, ConfirmationOutcome::Abort);
    assert!(cancel.is_cancelled());
}

#[test]
fn signals_typed_ahead_of_the_wait_still_count() {
    let (tx, gate, cancel) = gate_with_channel(Duration::from_millis(10));
    tx.send(HumanSignal::Abort).unwrap();

    let outcome = gate.wait(Duration::from_secs(5));

    assert_eq!(outcome, ConfirmationOutcome::Abort);
    assert!(cancel.is_cancelled());
}

#[test]
fn disconnected_signal_source_still_honors_the_deadline() {
    let (tx, gate, _cancel) = gate_with_channel(Duration::from_millis(20));
    drop(tx);

    let timeout = Duration::from_millis(80);
    let start = Instant::now();
    let outcome = gate.wait(timeout);

    assert_eq!(outcome, ConfirmationOutcome::TimeoutAutoProceed);
    assert!(start.elapsed() >= timeout);
}
