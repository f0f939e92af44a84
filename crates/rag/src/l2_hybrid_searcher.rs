//! Level 2 — Hybrid Searcher (§4.H).
//!
//! Runs three retrievers concurrently against the vector store — dense,
//! sparse, and a "semantic" pass using query expansion for recall
//! diversity — then fuses by max-score dedup on `document_id`.

use async_trait::async_trait;
use podwise_core::{
    CascadeValue, Domain, Embedder, Level, QueryContext, Result, SearchResult, SearchSource,
    VectorStore, VectorStoreFilter,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HybridSearcherConfig {
    pub threshold: f32,
    pub per_retriever_top_k: usize,
    pub fused_top_k: usize,
}

impl Default for HybridSearcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            per_retriever_top_k: 10,
            fused_top_k: 10,
        }
    }
}

pub struct HybridSearcher<VS, EM> {
    config: HybridSearcherConfig,
    vector_store: Arc<VS>,
    embedder: Arc<EM>,
    /// Query-expansion synonyms applied before the "semantic" retrieval
    /// pass, to diversify recall from the plain dense pass (§4.H).
    expansion_terms: Vec<(String, Vec<String>)>,
}

impl<VS, EM> HybridSearcher<VS, EM>
where
    VS: VectorStore,
    EM: Embedder,
{
    pub fn new(config: HybridSearcherConfig, vector_store: Arc<VS>, embedder: Arc<EM>) -> Self {
        Self {
            config,
            vector_store,
            embedder,
            expansion_terms: default_expansion_terms(),
        }
    }

    fn filter_for(&self, domain: Domain) -> VectorStoreFilter {
        match domain {
            Domain::Business => VectorStoreFilter::default().with_category("商業"),
            Domain::Education => VectorStoreFilter::default().with_category("教育"),
            _ => VectorStoreFilter::default(),
        }
    }

    fn expand(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        let mut expanded = query.to_string();
        for (term, synonyms) in &self.expansion_terms {
            if lowered.contains(term.as_str()) {
                for synonym in synonyms {
                    if !expanded.contains(synonym.as_str()) {
                        expanded.push(' ');
                        expanded.push_str(synonym);
                    }
                }
            }
        }
        expanded
    }

    async fn dense_search(&self, text: &str, filter: &VectorStoreFilter) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(std::slice::from_ref(&text.to_string())).await?;
        let vector = embedding.into_iter().next().unwrap_or_default();
        let mut results = self
            .vector_store
            .search(&vector, self.config.per_retriever_top_k, filter)
            .await?;
        for r in &mut results {
            r.metadata.insert("method".to_string(), serde_json::json!("dense"));
        }
        Ok(results)
    }

    async fn sparse_search(&self, text: &str, filter: &VectorStoreFilter) -> Result<Vec<SearchResult>> {
        let mut results = self
            .vector_store
            .search_sparse(text, self.config.per_retriever_top_k, filter)
            .await?;
        for r in &mut results {
            r.metadata.insert("method".to_string(), serde_json::json!("sparse"));
        }
        Ok(results)
    }

    async fn semantic_search(&self, text: &str, filter: &VectorStoreFilter) -> Result<Vec<SearchResult>> {
        let expanded = self.expand(text);
        let mut results = self.dense_search(&expanded, filter).await?;
        for r in &mut results {
            r.metadata.insert("method".to_string(), serde_json::json!("semantic"));
            r.source = SearchSource::Semantic;
        }
        Ok(results)
    }

    /// Union the three lists, dedupe by `document_id` keeping the max
    /// score, sort desc (ties by `document_id` asc for determinism, §5),
    /// trim to `fused_top_k` (§4.H, I6).
    fn fuse(&self, lists: [Vec<SearchResult>; 3]) -> Vec<SearchResult> {
        let mut best: HashMap<String, SearchResult> = HashMap::new();
        for list in lists {
            for result in list {
                best.entry(result.document_id.clone())
                    .and_modify(|existing| {
                        if result.score > existing.score {
                            *existing = result.clone();
                        }
                    })
                    .or_insert(result);
            }
        }
        let mut fused: Vec<SearchResult> = best.into_values().collect();
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        fused.truncate(self.config.fused_top_k);
        fused
    }

    fn confidence(results: &[SearchResult]) -> f32 {
        if results.is_empty() {
            return 0.0;
        }
        let mean_score: f32 = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
        let count_term = (results.len() as f32 / 5.0).min(1.0);
        (0.7 * mean_score + 0.3 * count_term).clamp(0.0, 1.0)
    }
}

fn default_expansion_terms() -> Vec<(String, Vec<String>)> {
    vec![
        ("投資".to_string(), vec!["理財".to_string(), "股票".to_string()]),
        ("創業".to_string(), vec!["新創".to_string(), "募資".to_string()]),
        ("科技".to_string(), vec!["技術".to_string(), "軟體".to_string()]),
    ]
}

#[async_trait]
impl<VS, EM> Level for HybridSearcher<VS, EM>
where
    VS: VectorStore,
    EM: Embedder,
{
    fn name(&self) -> &str {
        "L2"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let text = input
            .as_query()
            .map(|q| q.rewritten_query.clone())
            .unwrap_or_else(|| query.original_query.clone());

        if text.trim().is_empty() {
            return Ok((CascadeValue::Results(Vec::new()), 0.0));
        }

        let filter = self.filter_for(query.domain);

        let (dense, sparse, semantic) = tokio::join!(
            self.dense_search(&text, &filter),
            self.sparse_search(&text, &filter),
            self.semantic_search(&text, &filter),
        );

        let dense = dense.unwrap_or_default();
        let sparse = sparse.unwrap_or_default();
        let semantic = semantic.unwrap_or_default();

        let fused = self.fuse([dense, sparse, semantic]);
        let confidence = Self::confidence(&fused);

        Ok((CascadeValue::Results(fused), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult::new(id, "text", score, SearchSource::Dense)
    }

    #[test]
    fn confidence_is_zero_for_empty_results() {
        assert_eq!(HybridSearcher::<NoopStore, NoopEmbedder>::confidence(&[]), 0.0);
    }

    #[test]
    fn confidence_formula_matches_spec() {
        let results = vec![result("a", 0.8), result("b", 0.6)];
        let confidence = HybridSearcher::<NoopStore, NoopEmbedder>::confidence(&results);
        let expected = 0.7 * 0.7 + 0.3 * (2.0f32 / 5.0);
        assert!((confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn fuse_dedupes_by_document_id_keeping_max_score() {
        let searcher = make_searcher();
        let fused = searcher.fuse([
            vec![result("a", 0.5)],
            vec![result("a", 0.9), result("b", 0.4)],
            vec![],
        ]);
        assert_eq!(fused.len(), 2);
        let a = fused.iter().find(|r| r.document_id == "a").unwrap();
        assert_eq!(a.score, 0.9);
    }

    #[test]
    fn fuse_sorts_desc_then_by_id_asc() {
        let searcher = make_searcher();
        let fused = searcher.fuse([
            vec![result("z", 0.5), result("a", 0.5)],
            vec![],
            vec![],
        ]);
        assert_eq!(fused[0].document_id, "a");
        assert_eq!(fused[1].document_id, "z");
    }

    struct NoopStore;
    #[async_trait::async_trait]
    impl VectorStore for NoopStore {
        async fn create_collection(&self) -> Result<()> { Ok(()) }
        async fn drop_collection(&self) -> Result<()> { Ok(()) }
        async fn upsert(&self, _chunks: &[podwise_core::Chunk]) -> Result<()> { Ok(()) }
        async fn flush(&self) -> Result<()> { Ok(()) }
        async fn search(&self, _q: &[f32], _k: usize, _f: &VectorStoreFilter) -> Result<Vec<SearchResult>> { Ok(vec![]) }
        async fn search_sparse(&self, _q: &str, _k: usize, _f: &VectorStoreFilter) -> Result<Vec<SearchResult>> { Ok(vec![]) }
        async fn num_entities(&self) -> Result<u64> { Ok(0) }
    }

    struct NoopEmbedder;
    #[async_trait::async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; podwise_core::EMBEDDING_DIM]).collect())
        }
    }

    fn make_searcher() -> HybridSearcher<NoopStore, NoopEmbedder> {
        HybridSearcher::new(
            HybridSearcherConfig::default(),
            Arc::new(NoopStore),
            Arc::new(NoopEmbedder),
        )
    }
}
