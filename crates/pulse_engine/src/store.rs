use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use thiserror::Error;

use pulse_core::{FinalizeReply, RawRecord, SyncMark, Target, TargetSelector};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown target {0}")]
    UnknownTarget(String),
    #[error("finalize procedure error: {0}")]
    Procedure(String),
}

/// Work list and raw-record persistence.
///
/// Record inserts are staged until `commit`; `rollback` discards staged rows.
/// That is the per-target transaction boundary: the queue commits after each
/// target's writes and rolls back when the target fails mid-way.
pub trait Store: Send + Sync {
    /// Resolves the selector against the work list, in stable store order.
    fn query_targets(&self, selector: &TargetSelector) -> Result<Vec<Target>, StoreError>;

    /// Clears every target's sync mark.
    fn reset_sync_marks(&self) -> Result<(), StoreError>;

    fn set_sync_mark(&self, name: &str, mark: Option<SyncMark>) -> Result<(), StoreError>;

    /// Stages records for the current transaction.
    fn insert_records(&self, records: &[RawRecord]) -> Result<(), StoreError>;

    fn update_last_update(&self, name: &str, date: NaiveDate) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;

    fn failed_count(&self) -> Result<usize, StoreError>;

    /// Invokes the downstream finalize procedure and returns its two
    /// out-parameters.
    fn call_finalize_procedure(&self) -> Result<FinalizeReply, StoreError>;
}

/// Insertion-ordered in-memory store.
///
/// Serves the tests and the bundled runner; a database-backed deployment
/// implements [`Store`] over its own schema instead.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    targets: Vec<Target>,
    committed: Vec<RawRecord>,
    staged: Vec<RawRecord>,
    finalize_calls: u32,
    finalize_reply: Option<FinalizeReply>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner
                .targets
                .extend(names.into_iter().map(|name| Target::new(name)));
        }
        store
    }

    pub fn insert_target(&self, target: Target) -> Result<(), StoreError> {
        self.lock()?.targets.push(target);
        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<Target> {
        self.lock()
            .ok()?
            .targets
            .iter()
            .find(|target| target.name == name)
            .cloned()
    }

    /// Committed records in insertion order.
    pub fn records(&self) -> Vec<RawRecord> {
        self.lock()
            .map(|inner| inner.committed.clone())
            .unwrap_or_default()
    }

    pub fn finalize_calls(&self) -> u32 {
        self.lock().map(|inner| inner.finalize_calls).unwrap_or(0)
    }

    /// Overrides the reply the finalize procedure returns.
    pub fn set_finalize_reply(&self, reply: FinalizeReply) {
        if let Ok(mut inner) = self.lock() {
            inner.finalize_reply = Some(reply);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }
}

impl Store for MemoryStore {
    fn query_targets(&self, selector: &TargetSelector) -> Result<Vec<Target>, StoreError> {
        Ok(self
            .lock()?
            .targets
            .iter()
            .filter(|target| selector.matches(target))
            .cloned()
            .collect())
    }

    fn reset_sync_marks(&self) -> Result<(), StoreError> {
        for target in &mut self.lock()?.targets {
            target.sync_mark = None;
        }
        Ok(())
    }

    fn set_sync_mark(&self, name: &str, mark: Option<SyncMark>) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let target = inner
            .targets
            .iter_mut()
            .find(|target| target.name == name)
            .ok_or_else(|| StoreError::UnknownTarget(name.to_string()))?;
        target.sync_mark = mark;
        Ok(())
    }

    fn insert_records(&self, records: &[RawRecord]) -> Result<(), StoreError> {
        self.lock()?.staged.extend_from_slice(records);
        Ok(())
    }

    fn update_last_update(&self, name: &str, date: NaiveDate) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let target = inner
            .targets
            .iter_mut()
            .find(|target| target.name == name)
            .ok_or_else(|| StoreError::UnknownTarget(name.to_string()))?;
        target.last_update = Some(date);
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let staged = std::mem::take(&mut inner.staged);
        inner.committed.extend(staged);
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.lock()?.staged.clear();
        Ok(())
    }

    fn failed_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .targets
            .iter()
            .filter(|target| target.sync_mark == Some(SyncMark::Failed))
            .count())
    }

    fn call_finalize_procedure(&self) -> Result<FinalizeReply, StoreError> {
        let mut inner = self.lock()?;
        inner.finalize_calls += 1;
        Ok(inner.finalize_reply.clone().unwrap_or(FinalizeReply {
            code: 0,
            message: "ok".to_string(),
        }))
    }
}
