//! The ingestion data model: `Tag` and `Chunk` (§3).

use serde::{Deserialize, Serialize};

/// Embedding dimensionality fixed by the BGE-M3-class embedding model.
pub const EMBEDDING_DIM: usize = 1024;

/// Sentinel used for any string field whose true value could not be
/// resolved (missing metadata, failed join, etc). Never invented beyond
/// what §3/§4.D specify.
pub const UNKNOWN: &str = "未知";

/// A canonical topic label with a synonym closure. Immutable after the
/// lexicon registry loads it at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub synonyms: std::collections::BTreeSet<String>,
    pub category: String,
    pub polarity: Option<Polarity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Neutral,
    Negative,
}

impl Tag {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: truncate(&name.into(), 64),
            synonyms: std::collections::BTreeSet::new(),
            category: category.into(),
            polarity: None,
        }
    }
}

/// A bounded slice of an episode transcript plus its provenance and
/// embedding — the atom of the vector index (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    // Identity
    pub chunk_id: String,
    pub chunk_index: i64,

    // Content
    pub chunk_text: String,
    pub embedding: Vec<f32>,

    // Provenance
    pub episode_id: i64,
    pub podcast_id: i64,
    pub podcast_name: String,
    pub episode_title: String,
    pub author: String,
    pub category: String,
    pub duration: String,
    pub published_date: String,
    pub apple_rating: i64,
    pub language: String,

    // Processing metadata
    pub created_at: String,
    pub source_model: String,
    pub tags: String,
}

impl Chunk {
    /// Build a chunk row, coercing every field to its §3 bound. Never
    /// rejects a row: strings are truncated, the embedding is forced to
    /// exactly [`EMBEDDING_DIM`], tag lists are capped at 3 and comma-joined.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        chunk_id: impl Into<String>,
        chunk_index: i64,
        chunk_text: impl Into<String>,
        embedding: Vec<f32>,
        episode_id: i64,
        podcast_id: i64,
        podcast_name: impl Into<String>,
        episode_title: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
        duration: impl Into<String>,
        published_date: impl Into<String>,
        apple_rating: i64,
        language: impl Into<String>,
        created_at: impl Into<String>,
        source_model: impl Into<String>,
        tags: &[String],
    ) -> Self {
        let mut capped_tags: Vec<&String> = tags.iter().take(3).collect();
        capped_tags.dedup();
        let tags_joined = if capped_tags.is_empty() {
            UNKNOWN.to_string()
        } else {
            capped_tags
                .drain(..)
                .cloned()
                .collect::<Vec<_>>()
                .join(",")
        };

        Self {
            chunk_id: truncate(&chunk_id.into(), 64),
            chunk_index,
            chunk_text: truncate(&chunk_text.into(), 1024),
            embedding: coerce_embedding(embedding),
            episode_id,
            podcast_id,
            podcast_name: truncate(&podcast_name.into(), 255),
            episode_title: truncate(&episode_title.into(), 255),
            author: truncate(&author.into(), 255),
            category: truncate(&category.into(), 64),
            duration: truncate(&duration.into(), 255),
            published_date: truncate(&published_date.into(), 64),
            apple_rating,
            language: truncate(&language.into(), 16),
            created_at: truncate(&created_at.into(), 64),
            source_model: truncate(&source_model.into(), 64),
            tags: truncate(&tags_joined, 1024),
        }
    }

    /// I1: every string field within its bound, embedding exactly 1024-dim,
    /// tags capped at 3.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.chunk_id.chars().count() > 64 {
            return Err("chunk_id exceeds 64 chars".into());
        }
        if self.chunk_text.chars().count() > 1024 {
            return Err("chunk_text exceeds 1024 chars".into());
        }
        if self.embedding.len() != EMBEDDING_DIM {
            return Err(format!(
                "embedding has {} dims, expected {}",
                self.embedding.len(),
                EMBEDDING_DIM
            ));
        }
        if self.tag_list().len() > 3 {
            return Err("more than 3 tags".into());
        }
        Ok(())
    }

    pub fn tag_list(&self) -> Vec<&str> {
        if self.tags == UNKNOWN {
            Vec::new()
        } else {
            self.tags.split(',').filter(|t| !t.is_empty()).collect()
        }
    }

    /// Whether this row's provenance is fully resolved (vs the
    /// `episode_id = 0` sentinel used when metadata resolution failed,
    /// §4.D / §9).
    pub fn is_resolved(&self) -> bool {
        self.episode_id != 0
    }
}

/// Truncate a string to `max_chars` characters, replacing the final three
/// characters with `...` when truncation occurs (§4.D).
pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let keep = max_chars - 3;
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Force an embedding to exactly [`EMBEDDING_DIM`] dimensions, zero-padding
/// or truncating, then L2-normalize so cosine similarity reduces to a dot
/// product (§4.C). An all-zero input stays all-zero (adapter failure
/// sentinel) rather than being "normalized" into garbage.
pub fn coerce_embedding(mut v: Vec<f32>) -> Vec<f32> {
    v.resize(EMBEDDING_DIM, 0.0);
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Read-only relational record resolved by `podcast_id` + episode-title
/// matching; owned by the external metadata store (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: i64,
    pub podcast_id: i64,
    pub podcast_name: String,
    pub author: String,
    pub category: String,
    pub apple_rating: i64,
    pub episode_title: String,
    pub duration: String,
    pub published_date: String,
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_replaces_tail_with_ellipsis() {
        let truncated = truncate("abcdefghij", 5);
        assert_eq!(truncated.chars().count(), 5);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated, "ab...");
    }

    #[test]
    fn coerce_embedding_pads_and_normalizes() {
        let v = coerce_embedding(vec![3.0, 4.0]);
        assert_eq!(v.len(), EMBEDDING_DIM);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn coerce_embedding_keeps_zero_vector_zero() {
        let v = coerce_embedding(vec![0.0; 1024]);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn chunk_build_caps_tags_at_three() {
        let tags = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        let chunk = Chunk::build(
            "ep1_0",
            0,
            "text",
            vec![0.1; 1024],
            1,
            1,
            "pod",
            "ep",
            "author",
            "cat",
            "10m",
            "2024-01-01",
            5,
            "zh",
            "2024-01-01T00:00:00Z",
            "bge-m3",
            &tags,
        );
        assert_eq!(chunk.tag_list().len(), 3);
        chunk.check_invariants().unwrap();
    }

    #[test]
    fn chunk_with_no_tags_gets_unknown_sentinel() {
        let chunk = Chunk::build(
            "ep1_0", 0, "t", vec![0.0; 1024], 1, 1, "p", "e", "a", "c", "d", "date", 0, "zh",
            "now", "bge-m3", &[],
        );
        assert_eq!(chunk.tags, UNKNOWN);
        assert!(chunk.tag_list().is_empty());
    }

    #[test]
    fn unresolved_episode_id_sentinel() {
        let chunk = Chunk::build(
            "x_0", 0, "t", vec![0.0; 1024], 0, 1, "p", "e", "a", "c", "d", "date", 0, "zh", "now",
            "bge-m3", &[],
        );
        assert!(!chunk.is_resolved());
    }
}
