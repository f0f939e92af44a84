//! Level 6 — Hybrid Generator (§4.L).
//!
//! Composes a labeled context block from the top-3 compressed candidates,
//! calls two generators (general-purpose and domain-tuned), fuses and
//! re-summarizes their output, and runs a quality-control gate before
//! returning the terminal [`RAGResponse`].

use async_trait::async_trait;
use podwise_core::{
    CascadeValue, FallbackGenerator, Level, QueryContext, RAGResponse, Result, SearchResult,
};
use std::sync::Arc;
use std::time::Instant;

const TOP_N: usize = 3;
const DETAILED_THRESHOLD: usize = 5;
const MAX_FUSED_WORDS: usize = 300;
const FORBIDDEN_TOKENS: &[&str] = &["抱歉，我不知道", "I cannot help with that", "I don't know"];

#[derive(Debug, Clone)]
pub struct HybridGeneratorConfig {
    pub threshold: f32,
}

impl Default for HybridGeneratorConfig {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

pub struct HybridGenerator<G1, G2> {
    config: HybridGeneratorConfig,
    general: Arc<G1>,
    domain_tuned: Arc<G2>,
}

impl<G1, G2> HybridGenerator<G1, G2>
where
    G1: FallbackGenerator,
    G2: FallbackGenerator,
{
    pub fn new(config: HybridGeneratorConfig, general: Arc<G1>, domain_tuned: Arc<G2>) -> Self {
        Self {
            config,
            general,
            domain_tuned,
        }
    }

    fn compose_context(candidates: &[SearchResult]) -> String {
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn generate_variant(&self, query: &str, candidates: &[SearchResult]) -> Result<String> {
        let context_block = Self::compose_context(candidates);
        let prompt_query = format!("{context_block}\n\n問題：{query}");

        let (general_answer, domain_answer) = tokio::join!(
            self.general.generate(&prompt_query, Some(candidates)),
            self.domain_tuned.generate(&prompt_query, Some(candidates)),
        );

        let general_answer = general_answer.unwrap_or_default();
        let domain_answer = domain_answer.unwrap_or_default();

        let fused = format!(
            "【綜合觀點】{general_answer}\n【專業觀點】{domain_answer}"
        );
        Ok(summarize_to_word_limit(&fused, MAX_FUSED_WORDS))
    }

    fn passes_quality_control(answer: &str, candidates: &[SearchResult]) -> bool {
        let references_candidate = candidates
            .iter()
            .enumerate()
            .any(|(i, _)| answer.contains(&format!("[{}]", i + 1)));
        let has_forbidden = FORBIDDEN_TOKENS.iter().any(|token| answer.contains(token));
        references_candidate && !has_forbidden
    }

    fn variant_label(candidate_count: usize) -> &'static str {
        if candidate_count > DETAILED_THRESHOLD {
            "detailed"
        } else {
            "concise"
        }
    }
}

fn summarize_to_word_limit(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        let mut summary = words[..max_words].join(" ");
        summary.push_str("...");
        summary
    }
}

#[async_trait]
impl<G1, G2> Level for HybridGenerator<G1, G2>
where
    G1: FallbackGenerator,
    G2: FallbackGenerator,
{
    fn name(&self) -> &str {
        "L6"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let started = Instant::now();
        let available = input.as_results().map(|r| r.len()).unwrap_or(0);
        let candidates = input.into_results();
        let top_candidates: Vec<SearchResult> = candidates.into_iter().take(TOP_N).collect();

        if top_candidates.is_empty() {
            let response = RAGResponse::fallback("", started.elapsed());
            return Ok((CascadeValue::Answer(response), 0.0));
        }

        let mut answer = self.generate_variant(&query.original_query, &top_candidates).await?;

        if !Self::passes_quality_control(&answer, &top_candidates) {
            let retried = self
                .generate_variant(
                    &format!("{} (請務必標明引用來源編號，勿使用模糊回答)", query.original_query),
                    &top_candidates,
                )
                .await?;
            if Self::passes_quality_control(&retried, &top_candidates) {
                answer = retried;
            } else {
                let response = RAGResponse::fallback("", started.elapsed());
                return Ok((CascadeValue::Answer(response), 0.0));
            }
        }

        let variant = Self::variant_label(available);
        let sources: Vec<String> = top_candidates.iter().map(|c| c.document_id.clone()).collect();

        let mut response = RAGResponse {
            content: answer,
            confidence: 0.9,
            sources,
            level_used: podwise_core::LevelUsed::L6,
            processing_time: started.elapsed(),
            metadata: Default::default(),
        };
        response.metadata.insert("variant".to_string(), serde_json::json!(variant));

        Ok((CascadeValue::Answer(response), 0.9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwise_core::SearchSource;

    struct StubGenerator(&'static str);
    #[async_trait::async_trait]
    impl FallbackGenerator for StubGenerator {
        async fn generate(&self, _query: &str, _candidates: Option<&[SearchResult]>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn candidate(id: &str) -> SearchResult {
        SearchResult::new(id, "內容", 0.8, SearchSource::Compressed)
    }

    #[test]
    fn compose_context_labels_candidates() {
        let candidates = vec![candidate("a"), candidate("b")];
        let block = HybridGenerator::<StubGenerator, StubGenerator>::compose_context(&candidates);
        assert!(block.contains("[1]"));
        assert!(block.contains("[2]"));
    }

    #[test]
    fn variant_label_switches_on_candidate_count() {
        assert_eq!(HybridGenerator::<StubGenerator, StubGenerator>::variant_label(6), "detailed");
        assert_eq!(HybridGenerator::<StubGenerator, StubGenerator>::variant_label(3), "concise");
    }

    #[test]
    fn quality_control_requires_a_source_reference() {
        let candidates = vec![candidate("a")];
        assert!(!HybridGenerator::<StubGenerator, StubGenerator>::passes_quality_control(
            "沒有引用來源的回答",
            &candidates
        ));
        assert!(HybridGenerator::<StubGenerator, StubGenerator>::passes_quality_control(
            "根據 [1] 的內容回答",
            &candidates
        ));
    }

    #[tokio::test]
    async fn successful_generation_returns_top_three_sources() {
        let generator = HybridGenerator::new(
            HybridGeneratorConfig::default(),
            Arc::new(StubGenerator("根據 [1] 的內容，這是通用觀點。")),
            Arc::new(StubGenerator("根據 [1] 的內容，這是專業觀點。")),
        );
        let candidates: Vec<SearchResult> = (0..3).map(|i| candidate(&i.to_string())).collect();
        let (output, confidence) = generator
            .run(CascadeValue::Results(candidates), &QueryContext::raw("問題"))
            .await
            .unwrap();
        assert_eq!(confidence, 0.9);
        if let CascadeValue::Answer(response) = output {
            assert_eq!(response.sources.len(), 3);
            assert_eq!(response.level_used, podwise_core::LevelUsed::L6);
        } else {
            panic!("expected Answer variant");
        }
    }

    #[tokio::test]
    async fn empty_candidates_fall_through_with_zero_confidence() {
        let generator = HybridGenerator::new(
            HybridGeneratorConfig::default(),
            Arc::new(StubGenerator("x")),
            Arc::new(StubGenerator("y")),
        );
        let (_output, confidence) = generator
            .run(CascadeValue::Results(vec![]), &QueryContext::raw("問題"))
            .await
            .unwrap();
        assert_eq!(confidence, 0.0);
    }
}
