//! Durable ingestion bookkeeping: the progress journal (resumability) and
//! the error journal (per-unit ingestion failures), §3 / §6 / §9.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Atomic journal recording what ingestion has already finished. Updated
/// after every successfully processed document via write-temp-then-rename
/// so a crash never leaves a half-written journal (§4.F).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub last_updated: String,
    pub completed_collections: BTreeSet<String>,
    pub processed_files: BTreeSet<String>,
    pub cycle_count: u64,
    pub current_cycle: u64,
    pub total_chunks_written: u64,
}

impl ProgressRecord {
    pub fn is_collection_done(&self, collection_id: &str) -> bool {
        self.completed_collections.contains(collection_id)
    }

    pub fn is_file_done(&self, file: &str) -> bool {
        self.processed_files.contains(file)
    }

    pub fn mark_file_done(&mut self, file: impl Into<String>, chunks_written: u64) {
        self.processed_files.insert(file.into());
        self.total_chunks_written += chunks_written;
    }

    pub fn mark_collection_done(&mut self, collection_id: impl Into<String>) {
        self.completed_collections.insert(collection_id.into());
    }
}

/// Stage at which an ingestion error occurred, recorded alongside the
/// offending unit in the error journal (§4.F, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Fetch,
    Clean,
    Chunk,
    Tag,
    Embed,
    Metadata,
    Write,
    Progress,
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorStage::Fetch => "fetch",
            ErrorStage::Clean => "clean",
            ErrorStage::Chunk => "chunk",
            ErrorStage::Tag => "tag",
            ErrorStage::Embed => "embed",
            ErrorStage::Metadata => "metadata",
            ErrorStage::Write => "write",
            ErrorStage::Progress => "progress",
        };
        write!(f, "{s}")
    }
}

/// One row of the dual JSON+CSV error journal:
/// `(collection_id, rss_id, title, error_type, stage, message, timestamp)`
/// (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub collection_id: String,
    pub rss_id: String,
    pub title: String,
    pub error_type: String,
    pub stage: ErrorStage,
    pub message: String,
    pub timestamp: String,
}

impl ErrorRecord {
    pub fn to_csv_row(&self) -> String {
        let escape = |s: &str| s.replace('"', "\"\"");
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"",
            escape(&self.collection_id),
            escape(&self.rss_id),
            escape(&self.title),
            escape(&self.error_type),
            self.stage,
            escape(&self.message),
            self.timestamp,
        )
    }

    pub fn csv_header() -> &'static str {
        "collection_id,rss_id,title,error_type,stage,message,timestamp"
    }
}

/// Per-cycle ingestion statistics (§6: "Ingestion statistics: per-cycle
/// JSON with per-collection counts").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub cycle: u64,
    pub collections: std::collections::BTreeMap<String, CollectionStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub documents_processed: u64,
    pub documents_failed: u64,
    pub chunks_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tracks_files_and_collections() {
        let mut p = ProgressRecord::default();
        assert!(!p.is_file_done("a.json"));
        p.mark_file_done("a.json", 3);
        assert!(p.is_file_done("a.json"));
        assert_eq!(p.total_chunks_written, 3);
        p.mark_collection_done("RSS_1");
        assert!(p.is_collection_done("RSS_1"));
    }

    #[test]
    fn error_record_csv_escapes_quotes() {
        let rec = ErrorRecord {
            collection_id: "RSS_1".into(),
            rss_id: "1".into(),
            title: "a \"quoted\" title".into(),
            error_type: "DataError".into(),
            stage: ErrorStage::Metadata,
            message: "no match".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        assert!(rec.to_csv_row().contains("a \"\"quoted\"\" title"));
    }
}
