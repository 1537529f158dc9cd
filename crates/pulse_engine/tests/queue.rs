use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;

use pulse_core::{BatchResult, CancelFlag, PassKind, SyncMark, TargetSelector};
use pulse_engine::{
    Clock, ConfirmationGate, ExtractError, FetchError, FetchFailureKind, FragmentExtractor,
    HumanSignal, MemoryStore, PassError, RawPage, SessionFetcher, Store, WorkQueue,
};

fn init_logging() {
    pipeline_logging::initialize_for_tests();
}

fn clock_at(year: i32, month: u32, day: u32) -> Clock {
    Arc::new(move || Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap())
}

fn today(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Serves canned page bodies per target; one line per fragment.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, String>,
    fail: HashSet<String>,
    lose_session_on: Option<String>,
    opened: bool,
    current: Option<RawPage>,
}

impl ScriptedFetcher {
    fn with_pages(pairs: &[(&str, &str)]) -> Self {
        let mut fetcher = Self {
            opened: true,
            ..Self::default()
        };
        for (name, body) in pairs {
            fetcher.pages.insert(name.to_string(), body.to_string());
        }
        fetcher
    }

    fn failing(mut self, name: &str) -> Self {
        self.fail.insert(name.to_string());
        self
    }

    fn losing_session_on(mut self, name: &str) -> Self {
        self.lose_session_on = Some(name.to_string());
        self
    }
}

impl SessionFetcher for ScriptedFetcher {
    fn open(&mut self, _entry_url: &str) -> Result<(), FetchError> {
        self.opened = true;
        Ok(())
    }

    fn search_and_navigate(&mut self, target_name: &str) -> Result<String, FetchError> {
        if !self.opened {
            return Err(FetchError {
                kind: FetchFailureKind::SessionLost,
                message: "session not open".to_string(),
            });
        }
        if self.lose_session_on.as_deref() == Some(target_name) {
            self.opened = false;
            return Err(FetchError {
                kind: FetchFailureKind::SessionLost,
                message: "connection dropped".to_string(),
            });
        }
        if self.fail.contains(target_name) {
            return Err(FetchError {
                kind: FetchFailureKind::HttpStatus(500),
                message: "server error".to_string(),
            });
        }
        let body = self.pages.get(target_name).cloned().unwrap_or_default();
        let url = format!("https://research.example/stock/{target_name}");
        self.current = Some(RawPage {
            url: url.clone(),
            bytes: body.into_bytes(),
            content_type: Some("text/plain".to_string()),
        });
        Ok(url)
    }

    fn current_page_content(&self) -> Result<RawPage, FetchError> {
        self.current.clone().ok_or(FetchError {
            kind: FetchFailureKind::SessionLost,
            message: "no page loaded".to_string(),
        })
    }

    fn close(&mut self) {
        self.opened = false;
        self.current = None;
    }
}

/// Treats every nonempty line of the page body as one fragment.
struct LineExtractor;

impl FragmentExtractor for LineExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<String>, ExtractError> {
        let text = String::from_utf8_lossy(&page.bytes);
        if text.contains("BROKEN") {
            return Err(ExtractError::Selector("broken".to_string()));
        }
        Ok(text
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

#[test]
fn first_pass_resets_stale_marks_and_stores_in_order() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    store
        .set_sync_mark("ACME", Some(SyncMark::Failed))
        .unwrap();

    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "a1\na2"), ("BETA", "b1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert_eq!(
        result,
        BatchResult {
            processed: 2,
            failed: 0,
            records: 3,
            aborted: false,
        }
    );

    let names: Vec<String> = store
        .records()
        .iter()
        .map(|record| record.target_name.clone())
        .collect();
    assert_eq!(names, vec!["ACME", "ACME", "BETA"]);
    assert!(store
        .records()
        .iter()
        .all(|record| record.batch_seq == 1));

    let acme = store.target("ACME").unwrap();
    assert_eq!(acme.sync_mark, None);
    assert_eq!(acme.last_update, Some(today(2026, 3, 2)));
}

#[test]
fn single_target_failure_marks_failed_and_continues() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    let mut fetcher = ScriptedFetcher::with_pages(&[("BETA", "b1")]).failing("ACME");
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert_eq!(result.processed, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.records, 1);
    assert_eq!(
        store.target("ACME").unwrap().sync_mark,
        Some(SyncMark::Failed)
    );
    assert_eq!(store.target("BETA").unwrap().sync_mark, None);
}

#[test]
fn extract_failure_is_a_per_target_failure() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "BROKEN"), ("BETA", "b1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.processed, 1);
    assert_eq!(
        store.target("ACME").unwrap().sync_mark,
        Some(SyncMark::Failed)
    );
}

#[test]
fn session_loss_propagates_with_partial_counts() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA", "GAMMA"]);
    let mut fetcher =
        ScriptedFetcher::with_pages(&[("ACME", "a1")]).losing_session_on("BETA");
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let err = queue.run(&selector, PassKind::First, 1).unwrap_err();

    match err {
        PassError::SessionLost { partial, source } => {
            assert_eq!(partial.processed, 1);
            assert_eq!(partial.failed, 0);
            assert!(source.is_session_loss());
        }
        other => panic!("expected session loss, got {other:?}"),
    }

    // Already-stored results stand; the in-flight target keeps its pending
    // mark and the untouched one stays clear.
    assert_eq!(store.records().len(), 1);
    assert_eq!(
        store.target("BETA").unwrap().sync_mark,
        Some(SyncMark::Pending)
    );
    assert_eq!(store.target("GAMMA").unwrap().sync_mark, None);
}

#[test]
fn zero_fragment_page_is_not_a_failure() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME"]);
    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "   \n\n")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert_eq!(result.processed, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.records, 0);
    assert!(store.records().is_empty());

    let acme = store.target("ACME").unwrap();
    assert_eq!(acme.sync_mark, None);
    assert_eq!(acme.last_update, None);
}

#[test]
fn retry_pass_selects_exactly_the_failed_set() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA", "GAMMA"]);
    store
        .set_sync_mark("ACME", Some(SyncMark::Failed))
        .unwrap();
    store
        .set_sync_mark("GAMMA", Some(SyncMark::Failed))
        .unwrap();

    let mut fetcher =
        ScriptedFetcher::with_pages(&[("ACME", "a1"), ("BETA", "b1"), ("GAMMA", "g1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    let result = queue.run(&TargetSelector::Failed, PassKind::Retry, 2).unwrap();
    assert_eq!(result.processed, 2);

    let names: HashSet<String> = store
        .records()
        .iter()
        .map(|record| record.target_name.clone())
        .collect();
    assert_eq!(
        names,
        HashSet::from(["ACME".to_string(), "GAMMA".to_string()])
    );
    // The succeeded-in-between target was never reprocessed.
    assert!(!names.contains("BETA"));
    assert_eq!(store.target("ACME").unwrap().sync_mark, None);
    assert_eq!(store.target("GAMMA").unwrap().sync_mark, None);
}

#[test]
fn retry_pass_does_not_reset_marks_before_selection() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME"]);
    store
        .set_sync_mark("ACME", Some(SyncMark::Failed))
        .unwrap();

    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "a1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );

    // A reset before selection would leave nothing to retry.
    let result = queue.run(&TargetSelector::Failed, PassKind::Retry, 2).unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(store.records().len(), 1);
}

#[test]
fn cancel_flag_stops_the_pass_before_the_next_target() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "a1"), ("BETA", "b1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        cancel,
        clock_at(2026, 3, 2),
    );

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert!(result.aborted);
    assert_eq!(result.attempted(), 0);
    assert!(store.records().is_empty());
}

#[test]
fn gate_abort_stops_the_pass_and_clears_the_mark() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    let cancel = CancelFlag::new();
    let (tx, rx) = std::sync::mpsc::channel();
    tx.send(HumanSignal::Abort).unwrap();
    let gate = ConfirmationGate::new(rx, Duration::from_millis(10), cancel.clone());

    let mut fetcher = ScriptedFetcher::with_pages(&[("ACME", "a1"), ("BETA", "b1")]);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        cancel.clone(),
        clock_at(2026, 3, 2),
    )
    .with_gate(&gate, Duration::from_millis(100));

    let selector = TargetSelector::Due {
        today: today(2026, 3, 2),
    };
    let result = queue.run(&selector, PassKind::First, 1).unwrap();

    assert!(result.aborted);
    assert!(cancel.is_cancelled());
    assert_eq!(result.attempted(), 0);
    assert!(store.records().is_empty());
    // The aborted target did not fail; its mark is cleared.
    assert_eq!(store.target("ACME").unwrap().sync_mark, None);
}

#[test]
fn record_count_per_pass_is_deterministic() {
    init_logging();
    let store = MemoryStore::with_targets(["ACME", "BETA"]);
    let pages = [("ACME", "a1\na2"), ("BETA", "b1")];

    let mut fetcher = ScriptedFetcher::with_pages(&pages);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 2),
    );
    let first = queue
        .run(
            &TargetSelector::Due {
                today: today(2026, 3, 2),
            },
            PassKind::First,
            1,
        )
        .unwrap();

    // Next day, same source: the pass stores the same number of records.
    let mut fetcher = ScriptedFetcher::with_pages(&pages);
    let mut queue = WorkQueue::new(
        &store,
        &mut fetcher,
        &LineExtractor,
        CancelFlag::new(),
        clock_at(2026, 3, 3),
    );
    let second = queue
        .run(
            &TargetSelector::Due {
                today: today(2026, 3, 3),
            },
            PassKind::First,
            2,
        )
        .unwrap();

    assert_eq!(first.records, second.records);
    assert_eq!(store.records().len(), first.records + second.records);
}
