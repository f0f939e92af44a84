//! Integration test for the full L1-L6 cascade (§4.M, §8 scenario 5).
//!
//! Runs the same query twice through a `HierarchicalController` wired up
//! with a fixed vector store, a fixed embedder and deterministic
//! generators, and asserts the produced answer and its source ordering
//! are byte-identical across both runs.

use async_trait::async_trait;
use podwise_core::{
    CascadeValue, Embedder, FallbackGenerator, Level, QueryContext, Result, SearchResult,
    SearchSource, VectorStore, VectorStoreFilter, EMBEDDING_DIM,
};
use podwise_rag::{
    ContextAugmenter, ContextAugmenterConfig, ContextCompressor, ContextCompressorConfig,
    HierarchicalController, HybridGenerator, HybridGeneratorConfig, HybridSearcher,
    HybridSearcherConfig, QueryRequest, QueryRewriter, QueryRewriterConfig, Reranker,
    RerankerConfig,
};
use std::sync::Arc;

/// Three fixed candidates, all from the same episode, carrying the
/// metadata L3/L4 read (category, episode_title, tags, apple_rating,
/// published_date) so the happy path clears every level's threshold.
struct FixtureStore;

fn fixture_candidates() -> Vec<SearchResult> {
    let long_body = "關於投資與理財的深度分析內容，".repeat(30);
    vec![
        SearchResult::new("chunk_1", format!("第一段：{long_body}"), 0.95, SearchSource::Dense)
            .with_metadata("episode_id", "1")
            .with_metadata("category", "商業")
            .with_metadata("episode_title", "投資理財入門")
            .with_metadata("tags", "商業")
            .with_metadata("apple_rating", 5.0)
            .with_metadata("published_date", "2026-01-01"),
        SearchResult::new("chunk_2", format!("第二段：{long_body}"), 0.92, SearchSource::Dense)
            .with_metadata("episode_id", "1")
            .with_metadata("category", "商業")
            .with_metadata("episode_title", "投資理財入門")
            .with_metadata("tags", "商業")
            .with_metadata("apple_rating", 5.0)
            .with_metadata("published_date", "2026-01-01"),
        SearchResult::new("chunk_3", format!("第三段：{long_body}"), 0.9, SearchSource::Dense)
            .with_metadata("episode_id", "1")
            .with_metadata("category", "商業")
            .with_metadata("episode_title", "投資理財入門")
            .with_metadata("tags", "商業")
            .with_metadata("apple_rating", 5.0)
            .with_metadata("published_date", "2026-01-01"),
    ]
}

#[async_trait]
impl VectorStore for FixtureStore {
    async fn create_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn drop_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _chunks: &[podwise_core::Chunk]) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query_vector: &[f32], _top_k: usize, _filter: &VectorStoreFilter) -> Result<Vec<SearchResult>> {
        Ok(fixture_candidates())
    }

    async fn search_sparse(&self, _query_text: &str, _top_k: usize, _filter: &VectorStoreFilter) -> Result<Vec<SearchResult>> {
        Ok(fixture_candidates())
    }

    async fn num_entities(&self) -> Result<u64> {
        Ok(3)
    }
}

struct FixtureEmbedder;

#[async_trait]
impl Embedder for FixtureEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.2; EMBEDDING_DIM]).collect())
    }
}

struct StubGenerator(&'static str);

#[async_trait]
impl FallbackGenerator for StubGenerator {
    async fn generate(&self, _query: &str, _candidates: Option<&[SearchResult]>) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn build_controller() -> HierarchicalController {
    let vector_store = Arc::new(FixtureStore);
    let embedder = Arc::new(FixtureEmbedder);

    let levels: Vec<Arc<dyn Level>> = vec![
        Arc::new(QueryRewriter::new(QueryRewriterConfig::default())),
        Arc::new(HybridSearcher::new(
            HybridSearcherConfig::default(),
            vector_store.clone(),
            embedder,
        )),
        Arc::new(ContextAugmenter::new(ContextAugmenterConfig::default(), vector_store)),
        Arc::new(Reranker::new(RerankerConfig::default())),
        Arc::new(ContextCompressor::new(ContextCompressorConfig::default())),
        Arc::new(HybridGenerator::new(
            HybridGeneratorConfig::default(),
            Arc::new(StubGenerator("根據 [1] 的資料，投資理財的重點整理如下。")),
            Arc::new(StubGenerator("根據 [1] 的資料，從專業角度來看重點如下。")),
        )),
    ];

    HierarchicalController::new(levels, Arc::new(StubGenerator("很抱歉，目前無法回答。")))
}

#[tokio::test]
async fn identical_queries_produce_byte_identical_answers() {
    let controller = build_controller();
    let query = "投資理財 ai 產業分析";

    let first = controller.query(QueryRequest::new(query)).await;
    let second = controller.query(QueryRequest::new(query)).await;

    assert_eq!(first.content, second.content);
    assert_eq!(first.sources, second.sources);
    assert_eq!(first.level_used, second.level_used);
    assert_eq!(first.confidence, second.confidence);
}

#[tokio::test]
async fn cascade_reaches_l6_and_cites_top_candidates() {
    let controller = build_controller();
    let response = controller
        .query(QueryRequest::new("投資理財 ai 產業分析"))
        .await;

    assert_eq!(response.level_used, podwise_core::LevelUsed::L6);
    assert!(!response.sources.is_empty());
    assert!(response.content.contains("[1]"));
}
