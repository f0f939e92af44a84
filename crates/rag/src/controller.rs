//! Hierarchical Controller (§4.M).
//!
//! Holds the ordered list of cascade levels as a dynamic-dispatch registry
//! (§9 "Dynamic dispatch over levels") and runs every request through all
//! six unconditionally, gating only which level's output is reported as
//! `level_used`. Falls back to an external generator when nothing in the
//! cascade produced a usable answer within the request deadline.

use podwise_core::{CascadeValue, FallbackGenerator, Level, LevelUsed, QueryContext, RAGResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inbound query API shape consumed by the (out-of-scope) HTTP gateway
/// (§6).
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub category_filter: Option<String>,
    pub use_hybrid_search: bool,
    pub deadline_ms: u64,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        let deadline_ms = podwise_config::TimeoutConfig::default().request_deadline_ms;
        Self {
            query: query.into(),
            user_id: None,
            session_id: None,
            category_filter: None,
            use_hybrid_search: true,
            deadline_ms,
        }
    }
}

pub struct HierarchicalController {
    levels: Vec<Arc<dyn Level>>,
    fallback: Arc<dyn FallbackGenerator>,
}

impl HierarchicalController {
    /// `levels` must be supplied in cascade order (L1..L6); adding a
    /// level is a registry edit here, not a rewrite of this controller
    /// (§9).
    pub fn new(levels: Vec<Arc<dyn Level>>, fallback: Arc<dyn FallbackGenerator>) -> Self {
        Self { levels, fallback }
    }

    pub async fn query(&self, request: QueryRequest) -> RAGResponse {
        let started = Instant::now();
        let deadline = Duration::from_millis(request.deadline_ms);

        if request.query.trim().is_empty() {
            return self.run_fallback(&request.query, started, HashMap::new()).await;
        }

        let mut value = CascadeValue::Query(QueryContext::raw(&request.query));
        let mut context = QueryContext::raw(&request.query);
        let mut level_confidences: HashMap<String, f32> = HashMap::new();
        let mut last_passed: Option<(&str, f32)> = None;
        let mut deadline_exceeded = false;

        for level in &self.levels {
            if started.elapsed() >= deadline {
                deadline_exceeded = true;
                break;
            }

            let (output, confidence) = match level.run(value, &context).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(level = level.name(), error = %e, "level returned an error, treating as zero confidence");
                    (CascadeValue::Results(Vec::new()), 0.0)
                }
            };

            tracing::debug!(level = level.name(), confidence, threshold = level.threshold(), "level complete");
            level_confidences.insert(level.name().to_string(), confidence);

            if let Some(updated_context) = output.as_query() {
                context = updated_context.clone();
            }

            if confidence >= level.threshold() {
                last_passed = Some((level.name(), confidence));
            }

            value = output;
        }

        if deadline_exceeded {
            return self
                .run_fallback(&request.query, started, level_confidences_to_metadata(level_confidences))
                .await;
        }

        // Every level always runs (§4.M); only the terminal generator's
        // own pass/fail decides the outcome. Earlier levels' acceptance
        // only affects what input later levels saw, matching the
        // original pipeline: level_used is overwritten at every
        // passing level, but only the write after L6 is ever observed
        // by the caller.
        if let CascadeValue::Answer(mut response) = value {
            let l6_passed = last_passed.map(|(name, _)| name == "L6").unwrap_or(false);
            if l6_passed && !response.content.is_empty() {
                response.processing_time = started.elapsed();
                return with_level_metadata(response, &level_confidences);
            }
        }

        self.run_fallback(&request.query, started, level_confidences_to_metadata(level_confidences))
            .await
    }

    async fn run_fallback(
        &self,
        query: &str,
        started: Instant,
        metadata: HashMap<String, serde_json::Value>,
    ) -> RAGResponse {
        tracing::warn!("no cascade level reached its threshold, invoking fallback generator");
        let text = self
            .fallback
            .generate(query, None)
            .await
            .unwrap_or_else(|_| polite_fallback_message());
        let mut response = RAGResponse::fallback(text, started.elapsed());
        response.metadata = metadata;
        response
    }
}

fn polite_fallback_message() -> String {
    "很抱歉，目前無法為您的問題找到合適的答案，請稍後再試。".to_string()
}

fn level_confidences_to_metadata(
    level_confidences: HashMap<String, f32>,
) -> HashMap<String, serde_json::Value> {
    let mut map = HashMap::new();
    map.insert(
        "level_confidences".to_string(),
        serde_json::to_value(level_confidences).unwrap_or_default(),
    );
    map
}

fn with_level_metadata(mut response: RAGResponse, level_confidences: &HashMap<String, f32>) -> RAGResponse {
    response.metadata.insert(
        "level_confidences".to_string(),
        serde_json::to_value(level_confidences).unwrap_or_default(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use podwise_core::{Result, SearchResult};

    struct AlwaysRejectLevel {
        name: &'static str,
    }
    #[async_trait]
    impl Level for AlwaysRejectLevel {
        fn name(&self) -> &str {
            self.name
        }
        fn threshold(&self) -> f32 {
            0.99
        }
        async fn run(&self, input: CascadeValue, _query: &QueryContext) -> Result<(CascadeValue, f32)> {
            let passthrough = match input {
                CascadeValue::Query(q) => CascadeValue::Query(q),
                CascadeValue::Results(r) => CascadeValue::Results(r),
                CascadeValue::Answer(a) => CascadeValue::Answer(a),
            };
            Ok((passthrough, 0.1))
        }
    }

    struct StubFallback;
    #[async_trait]
    impl FallbackGenerator for StubFallback {
        async fn generate(&self, _query: &str, _candidates: Option<&[SearchResult]>) -> Result<String> {
            Ok("fallback answer".to_string())
        }
    }

    #[tokio::test]
    async fn empty_query_goes_straight_to_fallback() {
        let controller = HierarchicalController::new(vec![], Arc::new(StubFallback));
        let response = controller.query(QueryRequest::new("")).await;
        assert_eq!(response.level_used, LevelUsed::Fallback);
        assert_eq!(response.confidence, 0.8);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn all_levels_rejecting_falls_back() {
        let levels: Vec<Arc<dyn Level>> = vec![
            Arc::new(AlwaysRejectLevel { name: "L1" }),
            Arc::new(AlwaysRejectLevel { name: "L2" }),
        ];
        let controller = HierarchicalController::new(levels, Arc::new(StubFallback));
        let response = controller.query(QueryRequest::new("test query")).await;
        assert_eq!(response.level_used, LevelUsed::Fallback);
        assert_eq!(response.content, "fallback answer");
    }

    #[tokio::test]
    async fn immediate_deadline_short_circuits_to_fallback() {
        let levels: Vec<Arc<dyn Level>> = vec![Arc::new(AlwaysRejectLevel { name: "L1" })];
        let controller = HierarchicalController::new(levels, Arc::new(StubFallback));
        let mut request = QueryRequest::new("test query");
        request.deadline_ms = 0;
        let response = controller.query(request).await;
        assert_eq!(response.level_used, LevelUsed::Fallback);
    }

    struct AlwaysAnswerLevel;
    #[async_trait]
    impl Level for AlwaysAnswerLevel {
        fn name(&self) -> &str {
            "L6"
        }
        fn threshold(&self) -> f32 {
            0.7
        }
        async fn run(&self, _input: CascadeValue, _query: &QueryContext) -> Result<(CascadeValue, f32)> {
            let response = RAGResponse {
                content: "根據 [1] 的內容回答".to_string(),
                confidence: 0.9,
                sources: vec!["doc_1".to_string()],
                level_used: LevelUsed::L6,
                processing_time: std::time::Duration::from_millis(1),
                metadata: Default::default(),
            };
            Ok((CascadeValue::Answer(response), 0.9))
        }
    }

    #[tokio::test]
    async fn l6_pass_returns_its_answer_directly() {
        let levels: Vec<Arc<dyn Level>> = vec![Arc::new(AlwaysAnswerLevel)];
        let controller = HierarchicalController::new(levels, Arc::new(StubFallback));
        let response = controller.query(QueryRequest::new("test query")).await;
        assert_eq!(response.level_used, LevelUsed::L6);
        assert_eq!(response.sources, vec!["doc_1".to_string()]);
        assert!(response.metadata.contains_key("level_confidences"));
    }
}
