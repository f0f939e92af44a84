//! Candidates that flow through the hybrid search / rerank / compress
//! pipeline (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Dense,
    Sparse,
    Semantic,
    Augmented,
    Reranked,
    Compressed,
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchSource::Dense => "dense",
            SearchSource::Sparse => "sparse",
            SearchSource::Semantic => "semantic",
            SearchSource::Augmented => "augmented",
            SearchSource::Reranked => "reranked",
            SearchSource::Compressed => "compressed",
        };
        write!(f, "{s}")
    }
}

/// A single retrieval candidate as it threads through L2..L5. `metadata`
/// is a free-form bag; `document_id` is a chunk's `chunk_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub content: String,
    pub score: f32,
    pub source: SearchSource,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SearchResult {
    pub fn new(
        document_id: impl Into<String>,
        content: impl Into<String>,
        score: f32,
        source: SearchSource,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            content: content.into(),
            score: score.clamp(0.0, 1.0),
            source,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }
}
