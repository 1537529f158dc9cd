use chrono::{DateTime, Utc};

/// One persisted text fragment extracted from a target's fetched page.
///
/// Append-only. `batch_seq` correlates records written by the same pass;
/// within a pass, records keep target-iteration order and, per target,
/// document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub batch_seq: u32,
    pub target_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
