//! Evaluator (§4.N).
//!
//! Offline scoring of a generated answer against its sources and the
//! query that produced it, plus a comparison mode for benchmarking two
//! generator backends over a shared query set.

use podwise_core::RAGResponse;
use std::collections::HashSet;

const MAX_CONFIDENCE_SOURCES: usize = 5;
const IDEAL_ANSWER_WORDS: f32 = 120.0;

/// Per-answer evaluation scores, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationScores {
    pub confidence: f32,
    pub factuality: f32,
    pub relevance: f32,
    pub coherence: f32,
}

impl EvaluationScores {
    /// Unweighted mean of the four dimensions, used to rank backends in
    /// comparison mode.
    pub fn overall(&self) -> f32 {
        (self.confidence + self.factuality + self.relevance + self.coherence) / 4.0
    }
}

pub struct Evaluator;

impl Evaluator {
    /// Derived from the number of sources cited and the answer's length
    /// relative to a plausible well-formed answer (§4.N). Neither signal
    /// alone is reliable: an answer with many sources but no text, or
    /// plenty of text but no sources, both score low.
    fn confidence(answer: &str, sources: &[String]) -> f32 {
        let source_score = (sources.len() as f32 / MAX_CONFIDENCE_SOURCES as f32).min(1.0);
        let word_count = answer.split_whitespace().count() as f32;
        let length_score = (word_count / IDEAL_ANSWER_WORDS).min(1.0);
        (0.5 * source_score + 0.5 * length_score).clamp(0.0, 1.0)
    }

    /// Proportion of `[N]` source markers in the answer that correspond
    /// to an actual index into `sources`.
    fn factuality(answer: &str, sources: &[String]) -> f32 {
        let referenced: Vec<usize> = (1..=sources.len())
            .filter(|i| answer.contains(&format!("[{i}]")))
            .collect();
        if sources.is_empty() {
            return 0.0;
        }
        referenced.len() as f32 / sources.len() as f32
    }

    /// Token overlap between the answer and the original query.
    fn relevance(answer: &str, query: &str) -> f32 {
        let query_tokens: HashSet<&str> = query.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let answer_tokens: HashSet<&str> = answer.split_whitespace().collect();
        let overlap = query_tokens.intersection(&answer_tokens).count();
        overlap as f32 / query_tokens.len() as f32
    }

    /// `1 - normalized variance` of sentence lengths (in words); a
    /// high-variance answer (one ten-word sentence, one hundred-word
    /// sentence) reads as less coherent than one with uniform sentences.
    fn coherence(answer: &str) -> f32 {
        let sentence_lengths: Vec<f32> = answer
            .split(|c| c == '。' || c == '.' || c == '！' || c == '!' || c == '？' || c == '?')
            .map(|s| s.split_whitespace().count() as f32)
            .filter(|&len| len > 0.0)
            .collect();

        if sentence_lengths.len() < 2 {
            return 1.0;
        }

        let mean = sentence_lengths.iter().sum::<f32>() / sentence_lengths.len() as f32;
        let variance = sentence_lengths.iter().map(|l| (l - mean).powi(2)).sum::<f32>()
            / sentence_lengths.len() as f32;
        let normalized_variance = (variance / (mean * mean).max(1.0)).min(1.0);
        1.0 - normalized_variance
    }

    pub fn evaluate(response: &RAGResponse, query: &str) -> EvaluationScores {
        EvaluationScores {
            confidence: Self::confidence(&response.content, &response.sources),
            factuality: Self::factuality(&response.content, &response.sources),
            relevance: Self::relevance(&response.content, query),
            coherence: Self::coherence(&response.content),
        }
    }

    /// Runs the same query set through both responses and reports which
    /// backend scored higher overall, for offline A/B comparison of
    /// generator backends.
    pub fn compare<'a>(
        queries: &[&str],
        backend_a: &'a [RAGResponse],
        backend_b: &'a [RAGResponse],
    ) -> ComparisonReport {
        assert_eq!(queries.len(), backend_a.len());
        assert_eq!(queries.len(), backend_b.len());

        let mut a_wins = 0usize;
        let mut b_wins = 0usize;
        let mut ties = 0usize;
        let mut per_query = Vec::with_capacity(queries.len());

        for ((query, a), b) in queries.iter().zip(backend_a).zip(backend_b) {
            let scores_a = Self::evaluate(a, query);
            let scores_b = Self::evaluate(b, query);
            let overall_a = scores_a.overall();
            let overall_b = scores_b.overall();

            if (overall_a - overall_b).abs() < f32::EPSILON {
                ties += 1;
            } else if overall_a > overall_b {
                a_wins += 1;
            } else {
                b_wins += 1;
            }

            per_query.push((scores_a, scores_b));
        }

        ComparisonReport {
            a_wins,
            b_wins,
            ties,
            per_query,
        }
    }
}

/// Aggregate result of [`Evaluator::compare`].
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub a_wins: usize,
    pub b_wins: usize,
    pub ties: usize,
    pub per_query: Vec<(EvaluationScores, EvaluationScores)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwise_core::LevelUsed;
    use std::time::Duration;

    fn response(content: &str, sources: Vec<&str>) -> RAGResponse {
        RAGResponse {
            content: content.to_string(),
            confidence: 0.9,
            sources: sources.into_iter().map(String::from).collect(),
            level_used: LevelUsed::L6,
            processing_time: Duration::from_millis(10),
            metadata: Default::default(),
        }
    }

    #[test]
    fn factuality_counts_only_referenced_sources() {
        let r = response("根據 [1] 的說法，這是結論", vec!["a", "b", "c"]);
        let score = Evaluator::factuality(&r.content, &r.sources);
        assert!((score - (1.0 / 3.0)).abs() < 1e-5);
    }

    #[test]
    fn factuality_with_no_sources_is_zero() {
        let r = response("沒有引用任何來源", vec![]);
        assert_eq!(Evaluator::factuality(&r.content, &r.sources), 0.0);
    }

    #[test]
    fn relevance_rewards_shared_tokens() {
        let score = Evaluator::relevance("台北 有 哪些 好吃 餐廳", "台北 餐廳 推薦");
        assert!(score > 0.0);
        let no_overlap = Evaluator::relevance("完全不相關的內容", "台北 餐廳 推薦");
        assert_eq!(no_overlap, 0.0);
    }

    #[test]
    fn coherence_is_perfect_for_single_sentence() {
        assert_eq!(Evaluator::coherence("這是一個簡單的句子"), 1.0);
    }

    #[test]
    fn coherence_penalizes_uneven_sentence_lengths() {
        let uniform = Evaluator::coherence("word word word. word word word. word word word.");
        let uneven = Evaluator::coherence("word. word word word word word word word word word word.");
        assert!(uniform > uneven);
    }

    #[test]
    fn confidence_rewards_sources_and_length() {
        let rich = response(&"word ".repeat(120), vec!["a", "b", "c", "d", "e"]);
        let sparse = response("short", vec![]);
        assert!(Evaluator::confidence(&rich.content, &rich.sources) > Evaluator::confidence(&sparse.content, &sparse.sources));
    }

    #[test]
    fn compare_counts_wins_per_backend() {
        let queries = vec!["台北 餐廳"];
        let strong = vec![response("台北 餐廳 [1] 推薦清單", vec!["a"])];
        let weak = vec![response("無關內容", vec![])];
        let report = Evaluator::compare(&queries, &strong, &weak);
        assert_eq!(report.a_wins, 1);
        assert_eq!(report.b_wins, 0);
    }
}
