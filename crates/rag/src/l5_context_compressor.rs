//! Level 5 — Context Compressor (§4.K).
//!
//! Strips bracketed annotations and filler tokens, collapses whitespace,
//! and caps each candidate's content to 200 chars.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use podwise_core::{CascadeValue, Level, QueryContext, Result, SearchResult};
use regex::Regex;

const MAX_LEN: usize = 200;

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[(（【][^\])）】]*[\])）】]").unwrap());

const FILLER_TOKENS: &[&str] = &["嗯", "啊", "那個", "um", "uh", "like", "you know"];

#[derive(Debug, Clone)]
pub struct ContextCompressorConfig {
    pub threshold: f32,
}

impl Default for ContextCompressorConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

pub struct ContextCompressor {
    config: ContextCompressorConfig,
}

impl ContextCompressor {
    pub fn new(config: ContextCompressorConfig) -> Self {
        Self { config }
    }

    /// Strip bracketed annotations, drop filler tokens, collapse
    /// whitespace, then cap length. Returns the compressed text and its
    /// `compression_ratio`.
    fn compress(text: &str) -> (String, f32) {
        let stripped = BRACKETED.replace_all(text, "");

        let mut without_filler = stripped.to_string();
        for filler in FILLER_TOKENS {
            without_filler = without_filler.replace(filler, "");
        }

        let collapsed: String = without_filler
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let original_len = text.chars().count().max(1);
        let capped = podwise_core::chunk::truncate(&collapsed, MAX_LEN);
        let ratio = capped.chars().count() as f32 / original_len as f32;
        (capped, ratio)
    }

    fn confidence(mean_ratio: f32) -> f32 {
        if (0.3..=0.7).contains(&mean_ratio) {
            0.9
        } else if mean_ratio < 0.3 {
            0.9 * mean_ratio / 0.3
        } else {
            (0.9 * (1.0 - mean_ratio) / 0.3).max(0.0)
        }
    }
}

#[async_trait]
impl Level for ContextCompressor {
    fn name(&self) -> &str {
        "L5"
    }

    fn threshold(&self) -> f32 {
        self.config.threshold
    }

    async fn run(&self, input: CascadeValue, _query: &QueryContext) -> Result<(CascadeValue, f32)> {
        let candidates = input.into_results();
        if candidates.is_empty() {
            return Ok((CascadeValue::Results(Vec::new()), 0.0));
        }

        let mut ratios = Vec::with_capacity(candidates.len());
        let compressed: Vec<SearchResult> = candidates
            .into_iter()
            .map(|mut candidate| {
                let (compressed_text, ratio) = Self::compress(&candidate.content);
                ratios.push(ratio);
                candidate.content = compressed_text;
                candidate.source = podwise_core::SearchSource::Compressed;
                candidate
                    .metadata
                    .insert("compression_ratio".to_string(), serde_json::json!(ratio));
                candidate
            })
            .collect();

        let mean_ratio = ratios.iter().sum::<f32>() / ratios.len() as f32;
        let confidence = Self::confidence(mean_ratio);

        Ok((CascadeValue::Results(compressed), confidence))
    }
}
