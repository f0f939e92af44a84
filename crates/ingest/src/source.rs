//! Source transcript store capability (§6): a document store organized
//! as collections named `RSS_<podcast_id>`, each document carrying a
//! file identifier plus either pre-split chunks or a raw transcript.

use async_trait::async_trait;
use podwise_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreChunked {
    pub chunk_text: String,
    pub chunk_index: i64,
    #[serde(default)]
    pub enhanced_tags: Vec<String>,
}

/// A single document within an `RSS_<podcast_id>` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub file: String,
    pub episode_title_hint: String,
    #[serde(default)]
    pub ep_number_hint: Option<String>,
    /// Already-split chunks, when the upstream pipeline pre-chunked the
    /// transcript (carrying its own `enhanced_tags` that the lexicon
    /// resolver may still refine).
    #[serde(default)]
    pub chunks: Vec<PreChunked>,
    /// Raw transcript text, used when `chunks` is empty.
    #[serde(default)]
    pub raw_transcript: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "zh".to_string()
}

impl RawDocument {
    /// The text the chunker should process: pre-chunked text rejoined,
    /// or the raw transcript.
    pub fn text_for_chunking(&self) -> String {
        if !self.chunks.is_empty() {
            self.chunks
                .iter()
                .map(|c| c.chunk_text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.raw_transcript.clone().unwrap_or_default()
        }
    }
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Collection IDs prefixed `RSS_` (§6, grounded in the source
    /// system's collection-discovery step).
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn list_documents(&self, collection_id: &str) -> Result<Vec<RawDocument>>;

    /// Parses `podcast_id` out of a collection ID shaped `RSS_<podcast_id>`.
    fn podcast_id_of(collection_id: &str) -> Option<i64> {
        collection_id.strip_prefix("RSS_").and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn podcast_id_extracted_from_collection_name() {
        struct Dummy;
        #[async_trait]
        impl TranscriptSource for Dummy {
            async fn list_collections(&self) -> Result<Vec<String>> {
                Ok(vec![])
            }
            async fn list_documents(&self, _collection_id: &str) -> Result<Vec<RawDocument>> {
                Ok(vec![])
            }
        }
        assert_eq!(Dummy::podcast_id_of("RSS_1500839292"), Some(1500839292));
        assert_eq!(Dummy::podcast_id_of("not_rss"), None);
    }
}
