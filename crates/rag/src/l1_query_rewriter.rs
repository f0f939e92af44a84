//! Level 1 — Query Rewriter (§4.G).
//!
//! Turns a raw query string into a [`QueryContext`]: expands abbreviations
//! and synonymizes domain terms, classifies intent and domain by keyword
//! lookup, and detects named entities against a small gazetteer. Each
//! sub-task independently contributes to confidence.

use async_trait::async_trait;
use podwise_core::{CascadeValue, Domain, Intent, Level, QueryContext, Result};
use std::collections::{BTreeMap, BTreeSet};
use parking_lot::RwLock;

/// Input longer than this is truncated before rewriting; downstream
/// levels still run on the truncated context (§8 boundary cases).
pub const MAX_QUERY_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct QueryRewriterConfig {
    pub threshold: f32,
}

impl Default for QueryRewriterConfig {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

pub struct QueryRewriter {
    config: QueryRewriterConfig,
    abbreviations: RwLock<BTreeMap<String, String>>,
    intent_keywords: RwLock<BTreeMap<Intent, Vec<String>>>,
    domain_keywords: RwLock<BTreeMap<Domain, Vec<String>>>,
    entity_gazetteer: RwLock<BTreeSet<String>>,
}

impl QueryRewriter {
    pub fn new(config: QueryRewriterConfig) -> Self {
        let rewriter = Self {
            config,
            abbreviations: RwLock::new(BTreeMap::new()),
            intent_keywords: RwLock::new(BTreeMap::new()),
            domain_keywords: RwLock::new(BTreeMap::new()),
            entity_gazetteer: RwLock::new(BTreeSet::new()),
        };
        rewriter.load_defaults();
        rewriter
    }

    fn load_defaults(&self) {
        let mut abbreviations = self.abbreviations.write();
        for (k, v) in [
            ("ep", "episode"),
            ("ai", "人工智慧"),
            ("vc", "創業投資"),
            ("roi", "投資報酬率"),
            ("cpi", "消費者物價指數"),
        ] {
            abbreviations.insert(k.to_string(), v.to_string());
        }
        drop(abbreviations);

        let mut intents = self.intent_keywords.write();
        intents.insert(
            Intent::Recommendation,
            vec!["推薦".into(), "建議".into(), "recommend".into(), "suggest".into()],
        );
        intents.insert(
            Intent::Analysis,
            vec!["分析".into(), "為什麼".into(), "analyze".into(), "explain".into()],
        );
        intents.insert(
            Intent::Search,
            vec!["找".into(), "搜尋".into(), "search".into(), "find".into()],
        );
        drop(intents);

        let mut domains = self.domain_keywords.write();
        domains.insert(
            Domain::Business,
            vec!["投資".into(), "理財".into(), "股票".into(), "創業".into(), "商業".into()],
        );
        domains.insert(
            Domain::Education,
            vec!["學習".into(), "教育".into(), "課程".into(), "考試".into()],
        );
        domains.insert(
            Domain::Technology,
            vec!["科技".into(), "程式".into(), "軟體".into(), "ai".into()],
        );
        drop(domains);

        let mut gazetteer = self.entity_gazetteer.write();
        for name in ["台灣", "美國", "台積電", "特斯拉", "輝達", "美聯儲"] {
            gazetteer.insert(name.to_string());
        }
    }

    pub fn register_abbreviation(&self, key: impl Into<String>, expansion: impl Into<String>) {
        self.abbreviations.write().insert(
            key.into().to_lowercase(),
            expansion.into(),
        );
    }

    pub fn register_entity(&self, name: impl Into<String>) {
        self.entity_gazetteer.write().insert(name.into());
    }

    /// Truncate to [`MAX_QUERY_CHARS`] chars and expand abbreviations /
    /// domain synonyms found as substrings.
    fn rewrite(&self, query: &str) -> String {
        let truncated: String = query.chars().take(MAX_QUERY_CHARS).collect();
        let lowered = truncated.to_lowercase();
        let mut rewritten = truncated.clone();

        let abbreviations = self.abbreviations.read();
        for (key, expansion) in abbreviations.iter() {
            if lowered.contains(key.as_str()) && !rewritten.contains(expansion.as_str()) {
                rewritten.push(' ');
                rewritten.push_str(expansion);
            }
        }
        rewritten
    }

    fn classify_intent(&self, text: &str) -> Intent {
        let lowered = text.to_lowercase();
        let keywords = self.intent_keywords.read();
        for intent in [Intent::Recommendation, Intent::Analysis, Intent::Search] {
            if let Some(terms) = keywords.get(&intent) {
                if terms.iter().any(|t| lowered.contains(t.as_str())) {
                    return intent;
                }
            }
        }
        Intent::General
    }

    fn classify_domain(&self, text: &str) -> Domain {
        let lowered = text.to_lowercase();
        let keywords = self.domain_keywords.read();
        for domain in [Domain::Business, Domain::Education, Domain::Technology] {
            if let Some(terms) = keywords.get(&domain) {
                if terms.iter().any(|t| lowered.contains(t.as_str())) {
                    return domain;
                }
            }
        }
        Domain::General
    }

    fn detect_entities(&self, text: &str) -> BTreeSet<String> {
        let gazetteer = self.entity_gazetteer.read();
        gazetteer
            .iter()
            .filter(|name| text.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Build a fully classified [`QueryContext`] and its confidence
    /// (§4.G). Never errors: an empty query yields confidence 0.
    pub fn build_context(&self, raw_query: &str) -> QueryContext {
        if raw_query.trim().is_empty() {
            return QueryContext::raw(raw_query);
        }

        let rewritten_query = self.rewrite(raw_query);
        let original_query: String = raw_query.chars().take(MAX_QUERY_CHARS).collect();
        let intent = self.classify_intent(&rewritten_query);
        let domain = self.classify_domain(&rewritten_query);
        let entities = self.detect_entities(&rewritten_query);

        let mut confidence = 0.0f32;
        if rewritten_query != original_query {
            confidence += 0.3;
        }
        if intent != Intent::General {
            confidence += 0.2;
        }
        confidence += (entities.len() as f32 * 0.1).min(0.2);
        if domain != Domain::General {
            confidence += 0.3;
        }
        confidence = confidence.clamp(0.0, 1.0);

        QueryContext {
            original_query,
            rewritten_query,
            intent,
            entities,
            domain,
            confidence,
        }
    }
}

#[async_trait]
impl Level for QueryRewriter {
    fn name(&self) -> &str {
        "L1"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let raw = input
            .as_query()
            .map(|q| q.original_query.clone())
            .unwrap_or_else(|| query.original_query.clone());
        let context = self.build_context(&raw);
        let confidence = context.confidence;
        Ok((CascadeValue::Query(context), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_yields_zero_confidence() {
        let rewriter = QueryRewriter::new(QueryRewriterConfig::default());
        let ctx = rewriter.build_context("   ");
        assert_eq!(ctx.confidence, 0.0);
    }

    #[test]
    fn business_query_accumulates_confidence() {
        let rewriter = QueryRewriter::new(QueryRewriterConfig::default());
        let ctx = rewriter.build_context("推薦投資理財相關的 podcast EP123 台積電");
        assert_eq!(ctx.domain, Domain::Business);
        assert_eq!(ctx.intent, Intent::Recommendation);
        assert!(ctx.entities.contains("台積電"));
        assert!(ctx.was_rewritten());
        assert!(ctx.confidence > 0.7);
    }

    #[test]
    fn general_query_has_low_confidence() {
        let rewriter = QueryRewriter::new(QueryRewriterConfig::default());
        let ctx = rewriter.build_context("今天天氣如何");
        assert_eq!(ctx.intent, Intent::General);
        assert_eq!(ctx.domain, Domain::General);
    }

    #[test]
    fn entity_contribution_caps_at_point_two() {
        let rewriter = QueryRewriter::new(QueryRewriterConfig::default());
        for name in ["甲", "乙", "丙"] {
            rewriter.register_entity(name);
        }
        let ctx = rewriter.build_context("甲乙丙三家公司的比較");
        assert_eq!(ctx.entities.len(), 3);
        // entity contribution alone (no rewrite/intent/domain match) stays <= 0.2
        assert!(ctx.confidence <= 0.2 + f32::EPSILON);
    }

    #[test]
    fn query_longer_than_limit_is_truncated() {
        let rewriter = QueryRewriter::new(QueryRewriterConfig::default());
        let long_query = "投資".repeat(3000);
        let ctx = rewriter.build_context(&long_query);
        assert!(ctx.original_query.chars().count() <= MAX_QUERY_CHARS);
    }
}
