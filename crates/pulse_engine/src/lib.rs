//! Pulse engine: fetch session, extraction, persistence and batch control flow.
mod decode;
mod export;
mod extract;
mod fetch;
mod finalize;
mod gate;
mod persist;
mod pipeline;
mod queue;
mod retry;
mod store;

pub use decode::{decode_page, DecodeError, DecodedPage};
pub use export::{export_records, ExportError, ExportSummary, EXPORT_FILENAME};
pub use extract::{ExtractError, ExtractRules, FragmentExtractor, OverviewExtractor};
pub use fetch::{
    FetchError, FetchFailureKind, FetchSettings, HttpSessionFetcher, RawPage, SessionFetcher,
};
pub use finalize::{FinalizeGuard, Finalizer};
pub use gate::{ConfirmationGate, HumanSignal};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{Pipeline, PipelineSettings};
pub use queue::{Clock, PassError, TargetError, WorkQueue};
pub use retry::RetryScheduler;
pub use store::{MemoryStore, Store, StoreError};
