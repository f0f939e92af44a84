//! External storage capabilities (§6 "External Interfaces").

use crate::{Chunk, Result, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scalar filters applied at the vector-store level (§4.E: category,
/// podcast_id, language, tags-substring).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreFilter {
    pub category: Option<String>,
    pub podcast_id: Option<i64>,
    pub language: Option<String>,
    pub tags_contains: Option<String>,
}

impl VectorStoreFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.podcast_id.is_none()
            && self.language.is_none()
            && self.tags_contains.is_none()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Required capabilities of the index (§4.E, §6): ANN search over a
/// 1024-d cosine space, scalar filters, idempotent upsert keyed by
/// `chunk_id`, create/drop/flush/num_entities for collection lifecycle.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with the §3 schema if it does not already
    /// exist. Idempotent.
    async fn create_collection(&self) -> Result<()>;

    async fn drop_collection(&self) -> Result<()>;

    /// Idempotent upsert by `chunk_id`. Re-ingestion of a source replaces
    /// rows sharing the same id (§3 Lifecycle).
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Persist/flush after a batch (§4.E).
    async fn flush(&self) -> Result<()>;

    /// ANN search by a pre-normalized query vector, optionally scoped by
    /// `filter`.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &VectorStoreFilter,
    ) -> Result<Vec<SearchResult>>;

    /// BM25-family term search over `chunk_text` and `tags` (§4.H sparse
    /// retriever).
    async fn search_sparse(
        &self,
        query_text: &str,
        top_k: usize,
        filter: &VectorStoreFilter,
    ) -> Result<Vec<SearchResult>>;

    async fn num_entities(&self) -> Result<u64>;

    /// Point lookup by `chunk_id`, used by L3 to fetch the immediately
    /// preceding/following chunk within the same episode (§4.I). Default
    /// implementation reports "not found" so stores that cannot support
    /// point lookups still satisfy the trait; L3 treats that the same as
    /// a genuinely missing neighbor.
    async fn get_chunk(&self, _chunk_id: &str) -> Result<Option<SearchResult>> {
        Ok(None)
    }
}

/// Result of the metadata resolver's 3-tier cascade (§4.D). `matched_tier`
/// lets callers and tests distinguish an exact/episode-number/fuzzy match
/// from the podcast-level fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEpisode {
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
    pub matched_tier: MatchTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    ExactTitle,
    EpisodeNumber,
    FuzzyTitle,
    PodcastFallback,
}

/// Read-only SQL metadata store: `podcasts` joined to `episodes` on
/// `podcast_id` (§6).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn resolve_episode(
        &self,
        podcast_id: i64,
        episode_title_hint: &str,
        ep_number_hint: Option<&str>,
    ) -> Result<ResolvedEpisode>;
}
