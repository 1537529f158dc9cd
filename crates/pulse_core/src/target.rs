use chrono::NaiveDate;

/// Per-target marker within the current run.
///
/// `Pending` means a pass is (or was, if the process died) working on the
/// target. `Failed` means the target's own processing step failed. The
/// untried/succeeded state is the absence of a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMark {
    Pending,
    Failed,
}

/// A named security on the persisted work list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub active: bool,
    pub last_update: Option<NaiveDate>,
    pub sync_mark: Option<SyncMark>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            last_update: None,
            sync_mark: None,
        }
    }
}

/// Query predicate resolved against the work list.
///
/// The in-memory store evaluates `matches` directly; a database-backed store
/// would translate the variant into its own query instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSelector {
    /// Active targets not refreshed today. Never-updated targets are due.
    Due { today: NaiveDate },
    /// Active targets marked failed by an earlier pass.
    Failed,
}

impl TargetSelector {
    pub fn matches(&self, target: &Target) -> bool {
        if !target.active {
            return false;
        }
        match self {
            TargetSelector::Due { today } => target.last_update != Some(*today),
            TargetSelector::Failed => target.sync_mark == Some(SyncMark::Failed),
        }
    }
}
