//! Level 3 — Retrieval Augmentation (§4.I).
//!
//! For each candidate, attaches the neighboring chunks in the same
//! episode plus podcast-level category/episode-title context, boosts the
//! score by a fixed factor, and never removes a candidate.

use async_trait::async_trait;
use podwise_core::{CascadeValue, Level, QueryContext, Result, SearchResult, SearchSource, VectorStore};
use std::sync::Arc;

const SCORE_BOOST: f32 = 1.1;

#[derive(Debug, Clone)]
pub struct ContextAugmenterConfig {
    pub threshold: f32,
}

impl Default for ContextAugmenterConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

pub struct ContextAugmenter<VS> {
    config: ContextAugmenterConfig,
    vector_store: Arc<VS>,
}

impl<VS> ContextAugmenter<VS>
where
    VS: VectorStore,
{
    pub fn new(config: ContextAugmenterConfig, vector_store: Arc<VS>) -> Self {
        Self { config, vector_store }
    }

    /// `chunk_id`s are built as `{file}_{chunk_index}` (§4.F); the
    /// neighbor at `chunk_index ± 1` shares the same `{file}` prefix.
    fn neighbor_id(chunk_id: &str, delta: i64) -> Option<String> {
        let (prefix, index_str) = chunk_id.rsplit_once('_')?;
        let index: i64 = index_str.parse().ok()?;
        let neighbor_index = index + delta;
        if neighbor_index < 0 {
            return None;
        }
        Some(format!("{prefix}_{neighbor_index}"))
    }

    async fn augment_one(&self, candidate: SearchResult) -> SearchResult {
        let episode_id = candidate.meta_str("episode_id").map(str::to_string);
        let mut augmented_any = false;
        let mut sections = vec![candidate.content.clone()];

        if let Some(preceding_id) = Self::neighbor_id(&candidate.document_id, -1) {
            if let Ok(Some(preceding)) = self.vector_store.get_chunk(&preceding_id).await {
                if same_episode(&episode_id, &preceding) {
                    sections.insert(0, preceding.content);
                    augmented_any = true;
                }
            }
        }
        if let Some(following_id) = Self::neighbor_id(&candidate.document_id, 1) {
            if let Ok(Some(following)) = self.vector_store.get_chunk(&following_id).await {
                if same_episode(&episode_id, &following) {
                    sections.push(following.content);
                    augmented_any = true;
                }
            }
        }

        let category = candidate.meta_str("category").map(str::to_string);
        let episode_title = candidate.meta_str("episode_title").map(str::to_string);
        if category.is_some() || episode_title.is_some() {
            augmented_any = true;
        }

        let mut content = sections.join(" ||| ");
        if let Some(title) = &episode_title {
            content = format!("[{title}] {content}");
        }
        if let Some(category) = &category {
            content = format!("{content} (#{category})");
        }

        let mut result = SearchResult::new(
            candidate.document_id,
            content,
            (candidate.score * SCORE_BOOST).min(1.0),
            SearchSource::Augmented,
        );
        result.metadata = candidate.metadata;
        result
            .metadata
            .insert("augmented".to_string(), serde_json::json!(augmented_any));
        result
    }
}

fn same_episode(episode_id: &Option<String>, other: &SearchResult) -> bool {
    match (episode_id, other.meta_str("episode_id")) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

#[async_trait]
impl<VS> Level for ContextAugmenter<VS>
where
    VS: VectorStore,
{
    fn name(&self) -> &str {
        "L3"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, _query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let candidates = input.into_results();
        if candidates.is_empty() {
            return Ok((CascadeValue::Results(Vec::new()), 0.0));
        }

        let total = candidates.len();
        let mut augmented = Vec::with_capacity(total);
        let mut augmented_count = 0usize;
        for candidate in candidates {
            let result = self.augment_one(candidate).await;
            let was_augmented = result
                .metadata
                .get("augmented")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if was_augmented {
                augmented_count += 1;
            }
            augmented.push(result);
        }

        let confidence = augmented_count as f32 / total as f32;
        Ok((CascadeValue::Results(augmented), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwise_core::VectorStoreFilter;

    struct StubStore;
    #[async_trait::async_trait]
    impl VectorStore for StubStore {
        async fn create_collection(&self) -> Result<()> { Ok(()) }
        async fn drop_collection(&self) -> Result<()> { Ok(()) }
        async fn upsert(&self, _chunks: &[podwise_core::Chunk]) -> Result<()> { Ok(()) }
        async fn flush(&self) -> Result<()> { Ok(()) }
        async fn search(&self, _q: &[f32], _k: usize, _f: &VectorStoreFilter) -> Result<Vec<SearchResult>> { Ok(vec![]) }
        async fn search_sparse(&self, _q: &str, _k: usize, _f: &VectorStoreFilter) -> Result<Vec<SearchResult>> { Ok(vec![]) }
        async fn num_entities(&self) -> Result<u64> { Ok(0) }
        async fn get_chunk(&self, chunk_id: &str) -> Result<Option<SearchResult>> {
            if chunk_id == "doc_0" {
                Ok(Some(SearchResult::new("doc_0", "previous sentence", 1.0, SearchSource::Dense)
                    .with_metadata("episode_id", "1")))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn neighbor_id_computes_prefix_and_index() {
        assert_eq!(ContextAugmenter::<StubStore>::neighbor_id("doc_5", -1), Some("doc_4".to_string()));
        assert_eq!(ContextAugmenter::<StubStore>::neighbor_id("doc_0", -1), None);
        assert_eq!(ContextAugmenter::<StubStore>::neighbor_id("doc_5", 1), Some("doc_6".to_string()));
    }

    #[tokio::test]
    async fn augmentation_never_drops_candidates_and_boosts_score() {
        let augmenter = ContextAugmenter::new(ContextAugmenterConfig::default(), Arc::new(StubStore));
        let candidates = vec![
            SearchResult::new("doc_1", "current sentence", 0.5, SearchSource::Dense)
                .with_metadata("episode_id", "1"),
        ];
        let (output, confidence) = augmenter
            .run(CascadeValue::Results(candidates), &QueryContext::raw("q"))
            .await
            .unwrap();
        let results = output.into_results();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.5);
        assert!(confidence > 0.0);
    }

    #[tokio::test]
    async fn empty_input_yields_zero_confidence_no_panic() {
        let augmenter = ContextAugmenter::new(ContextAugmenterConfig::default(), Arc::new(StubStore));
        let (output, confidence) = augmenter
            .run(CascadeValue::Results(vec![]), &QueryContext::raw("q"))
            .await
            .unwrap();
        assert!(output.into_results().is_empty());
        assert_eq!(confidence, 0.0);
    }
}
