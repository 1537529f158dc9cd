use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use pulse_core::RawRecord;

use crate::persist::{AtomicFileWriter, PersistError};

pub const EXPORT_FILENAME: &str = "records.jsonl";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: usize,
    pub output_path: PathBuf,
}

/// Writes committed records to `records.jsonl`, one JSON object per line,
/// preserving insertion order.
pub fn export_records(
    output_dir: &Path,
    records: &[RawRecord],
) -> Result<ExportSummary, ExportError> {
    let mut lines = String::new();
    for record in records {
        let line = json!({
            "batch_seq": record.batch_seq,
            "target_name": record.target_name,
            "text": record.text,
            "created_at": record.created_at.to_rfc3339(),
        });
        lines.push_str(&line.to_string());
        lines.push('\n');
    }

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    let output_path = writer.write(EXPORT_FILENAME, &lines)?;
    Ok(ExportSummary {
        record_count: records.len(),
        output_path,
    })
}
