//! Level 4 — Reranker (§4.J).
//!
//! Reorders augmented candidates by a weighted sum of relevance,
//! freshness, authority, diversity and novelty, then runs a greedy
//! diversity pass capped at 5 results.

use async_trait::async_trait;
use chrono::NaiveDate;
use podwise_core::{CascadeValue, Level, QueryContext, Result, SearchResult};
use std::collections::HashMap;

const WEIGHT_RELEVANCE: f32 = 0.4;
const WEIGHT_FRESHNESS: f32 = 0.2;
const WEIGHT_AUTHORITY: f32 = 0.2;
const WEIGHT_DIVERSITY: f32 = 0.1;
const WEIGHT_NOVELTY: f32 = 0.1;
const FRESHNESS_WINDOW_DAYS: i64 = 365;
const DIVERSITY_PENALTY: f32 = 0.8;
const MAX_PER_TAG: usize = 3;
const MAX_SELECTED: usize = 5;

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub threshold: f32,
    /// `today`, injected so tests are deterministic instead of reading
    /// the wall clock (freshness is computed relative to this date).
    pub reference_date: NaiveDate,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            reference_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }
    }
}

pub struct Reranker {
    config: RerankerConfig,
}

impl Reranker {
    pub fn new(config: RerankerConfig) -> Self {
        Self { config }
    }

    fn primary_tag(candidate: &SearchResult) -> String {
        candidate
            .meta_str("tags")
            .and_then(|t| t.split(',').next())
            .unwrap_or("未知")
            .to_string()
    }

    fn freshness(&self, candidate: &SearchResult) -> f32 {
        let Some(published) = candidate.meta_str("published_date") else {
            return 0.0;
        };
        let Ok(date) = NaiveDate::parse_from_str(published, "%Y-%m-%d") else {
            return 0.0;
        };
        let age_days = (self.config.reference_date - date).num_days();
        (1.0 - (age_days as f32 / FRESHNESS_WINDOW_DAYS as f32)).clamp(0.0, 1.0)
    }

    fn authority(candidate: &SearchResult) -> f32 {
        let rating = candidate.meta_f64("apple_rating").unwrap_or(0.0) as f32;
        (rating / 5.0).clamp(0.0, 1.0)
    }

    /// Score each candidate, then apply the §4.J diversity/novelty terms
    /// relative to the whole working set before the separate greedy
    /// diversity pass runs.
    fn score_all(&self, candidates: &[SearchResult]) -> Vec<f32> {
        let tag_counts: HashMap<String, usize> = candidates.iter().fold(HashMap::new(), |mut acc, c| {
            *acc.entry(Self::primary_tag(c)).or_insert(0) += 1;
            acc
        });
        let total = candidates.len() as f32;

        let mut seen_tags: HashMap<String, usize> = HashMap::new();
        candidates
            .iter()
            .map(|candidate| {
                let tag = Self::primary_tag(candidate);
                let relevance = candidate.score;
                let freshness = self.freshness(candidate);
                let authority = Self::authority(candidate);

                let seen_count = *seen_tags.get(&tag).unwrap_or(&0);
                let diversity = if seen_count > 0 { DIVERSITY_PENALTY } else { 1.0 };
                *seen_tags.entry(tag.clone()).or_insert(0) += 1;

                let frequency = *tag_counts.get(&tag).unwrap_or(&1) as f32;
                let novelty = (1.0 - frequency / total).clamp(0.0, 1.0);

                WEIGHT_RELEVANCE * relevance
                    + WEIGHT_FRESHNESS * freshness
                    + WEIGHT_AUTHORITY * authority
                    + WEIGHT_DIVERSITY * diversity
                    + WEIGHT_NOVELTY * novelty
            })
            .collect()
    }

    /// Greedily select candidates, skipping any whose primary tag already
    /// appears among the selected `>= MAX_PER_TAG` times; stop at
    /// `MAX_SELECTED` (§4.J).
    fn diversity_pass(candidates: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        let mut selected = Vec::new();
        for candidate in candidates {
            if selected.len() >= MAX_SELECTED {
                break;
            }
            let tag = Self::primary_tag(&candidate);
            let count = tag_counts.entry(tag).or_insert(0);
            if *count >= MAX_PER_TAG {
                continue;
            }
            *count += 1;
            selected.push(candidate);
        }
        selected
    }

    fn confidence(scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        let mean: f32 = scores.iter().sum::<f32>() / scores.len() as f32;
        let variance: f32 =
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / scores.len() as f32;
        (mean * (1.0 - variance)).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Level for Reranker {
    fn name(&self) -> &str {
        "L4"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, _query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let candidates = input.into_results();
        if candidates.is_empty() {
            return Ok((CascadeValue::Results(Vec::new()), 0.0));
        }

        let scores = self.score_all(&candidates);
        let confidence = Self::confidence(&scores);

        let mut scored: Vec<(SearchResult, f32)> = candidates.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let reordered: Vec<SearchResult> = scored
            .into_iter()
            .map(|(mut candidate, score)| {
                candidate.score = score.clamp(0.0, 1.0);
                candidate.source = podwise_core::SearchSource::Reranked;
                candidate
            })
            .collect();

        let selected = Self::diversity_pass(reordered);
        Ok((CascadeValue::Results(selected), confidence))
    }
}
