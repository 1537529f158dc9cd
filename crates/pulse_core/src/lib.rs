//! Pulse core: pure domain types, selector predicates and fragment passes.
mod batch;
mod cancel;
mod fragments;
mod record;
mod target;

pub use batch::{
    BatchResult, ConfirmationOutcome, ExitStatus, FinalizeOutcome, FinalizeReply, PassKind,
    PipelineReport,
};
pub use cancel::CancelFlag;
pub use fragments::{number_by_category, tidy_fragments, CATEGORY_KEYWORDS};
pub use record::RawRecord;
pub use target::{SyncMark, Target, TargetSelector};
