use chrono::NaiveDate;
use pulse_core::{SyncMark, Target, TargetSelector};

fn init_logging() {
    pipeline_logging::initialize_for_tests();
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn due_selector_includes_stale_and_never_updated_targets() {
    init_logging();
    let today = day(2026, 3, 2);

    let never = Target::new("NEVER");
    let stale = Target {
        last_update: Some(day(2026, 3, 1)),
        ..Target::new("STALE")
    };
    let fresh = Target {
        last_update: Some(today),
        ..Target::new("FRESH")
    };

    let selector = TargetSelector::Due { today };
    assert!(selector.matches(&never));
    assert!(selector.matches(&stale));
    assert!(!selector.matches(&fresh));
}

#[test]
fn inactive_targets_never_match() {
    let today = day(2026, 3, 2);
    let mut target = Target::new("IDLE");
    target.active = false;

    assert!(!TargetSelector::Due { today }.matches(&target));

    target.sync_mark = Some(SyncMark::Failed);
    assert!(!TargetSelector::Failed.matches(&target));
}

#[test]
fn failed_selector_matches_only_failed_marks() {
    let clean = Target::new("CLEAN");
    let pending = Target {
        sync_mark: Some(SyncMark::Pending),
        ..Target::new("PENDING")
    };
    let failed = Target {
        sync_mark: Some(SyncMark::Failed),
        ..Target::new("FAILED")
    };

    assert!(!TargetSelector::Failed.matches(&clean));
    assert!(!TargetSelector::Failed.matches(&pending));
    assert!(TargetSelector::Failed.matches(&failed));
}
