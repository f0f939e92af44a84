//! Text Cleaner & Chunker (§4.B).
//!
//! Deterministic: the same input always yields the identical chunk
//! sequence, which is what makes ingestion idempotent (I2, I8) and lets
//! `resume after crash` (I4) reproduce a clean run byte-for-byte.

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chunk_size: 1024 }
    }
}

/// A collection-ID-keyed cleanup hook applied before the general pipeline
/// (§4.B "Specialization hook"). Grounded in the source system's
/// hardcoded exception for one particular podcast collection whose
/// transcripts carried known artifacts — here that becomes a static
/// registry entry instead of an `if collection_id == "..."` special case.
pub type SpecialCleaner = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub struct TextChunker {
    config: ChunkerConfig,
    special_cleaners: HashMap<String, SpecialCleaner>,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            special_cleaners: HashMap::new(),
        }
    }

    /// Register a special cleaner for a collection ID. Registration is
    /// static: call this during startup wiring, not per-document.
    pub fn register_special_cleaner(&mut self, collection_id: impl Into<String>, cleaner: SpecialCleaner) {
        self.special_cleaners.insert(collection_id.into(), cleaner);
    }

    /// Clean and chunk a raw transcript for `collection_id`.
    pub fn chunk(&self, collection_id: &str, raw: &str, _language_hint: &str) -> Vec<String> {
        let pre_cleaned = if let Some(cleaner) = self.special_cleaners.get(collection_id) {
            cleaner(raw)
        } else {
            raw.to_string()
        };

        let cleaned = Self::clean(&pre_cleaned);
        Self::pack_paragraphs(&cleaned, self.config.max_chunk_size)
    }

    /// (1) strip control chars; (2) collapse runs of whitespace into one
    /// space but preserve newlines.
    fn clean(text: &str) -> String {
        let stripped: String = text
            .chars()
            .filter(|c| !c.is_control() || *c == '\n')
            .collect();

        let mut out = String::with_capacity(stripped.len());
        let mut pending_space = false;
        for line in stripped.split('\n') {
            if !out.is_empty() {
                out.push('\n');
            }
            pending_space = false;
            for word in line.split_whitespace() {
                if pending_space {
                    out.push(' ');
                }
                out.push_str(word);
                pending_space = true;
            }
        }
        out
    }

    /// (3) split on paragraph boundaries, pack into chunks of
    /// `max_chunk_size` chars, never splitting a paragraph unless it
    /// alone exceeds the bound (then hard-split on whitespace).
    fn pack_paragraphs(cleaned: &str, max_chunk_size: usize) -> Vec<String> {
        let paragraphs: Vec<&str> = cleaned
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs {
            let pieces = if paragraph.chars().count() > max_chunk_size {
                Self::hard_split(paragraph, max_chunk_size)
            } else {
                vec![paragraph.to_string()]
            };

            for piece in pieces {
                let piece_len = piece.chars().count();
                if piece_len > max_chunk_size {
                    // Already hard-split above; only reachable for a
                    // single word longer than the bound, which cannot be
                    // split further without breaking it mid-word.
                    if !current.is_empty() {
                        chunks.push(std::mem::take(&mut current));
                    }
                    chunks.push(piece);
                    continue;
                }

                let candidate_len = if current.is_empty() {
                    piece_len
                } else {
                    current.chars().count() + 1 + piece_len
                };

                if candidate_len > max_chunk_size {
                    chunks.push(std::mem::take(&mut current));
                    current = piece;
                } else {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(&piece);
                }
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks.into_iter().filter(|c| !c.trim().is_empty()).collect()
    }

    /// Hard-split an oversize paragraph on whitespace at <= bound.
    fn hard_split(paragraph: &str, max_chunk_size: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            let candidate_len = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };

            if candidate_len > max_chunk_size && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }

        if !current.is_empty() {
            out.push(current);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars_and_collapses_whitespace() {
        let chunker = TextChunker::new(ChunkerConfig::default());
        let chunks = chunker.chunk("RSS_1", "hello\x00   world\t\tfoo", "zh");
        assert_eq!(chunks, vec!["hello world foo".to_string()]);
    }

    #[test]
    fn splits_on_paragraph_boundaries_and_packs() {
        let chunker = TextChunker::new(ChunkerConfig {
            max_chunk_size: 20,
        });
        let chunks = chunker.chunk("RSS_1", "short one\nshort two\nshort three", "zh");
        // Each paragraph is short; packing should combine while staying
        // under the bound.
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn hard_splits_oversize_paragraph() {
        let chunker = TextChunker::new(ChunkerConfig { max_chunk_size: 10 });
        let long_paragraph = "aaaaa bbbbb ccccc ddddd";
        let chunks = chunker.chunk("RSS_1", long_paragraph, "en");
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.join(" "), long_paragraph);
    }

    #[test]
    fn empty_and_whitespace_only_chunks_discarded() {
        let chunker = TextChunker::new(ChunkerConfig::default());
        let chunks = chunker.chunk("RSS_1", "\n\n   \n\t\n", "zh");
        assert!(chunks.is_empty());
    }

    #[test]
    fn deterministic_same_input_same_output() {
        let chunker = TextChunker::new(ChunkerConfig::default());
        let text = "paragraph one here\nparagraph two over there\n\nparagraph three";
        let a = chunker.chunk("RSS_1", text, "zh");
        let b = chunker.chunk("RSS_1", text, "zh");
        assert_eq!(a, b);
    }

    #[test]
    fn special_cleaner_runs_before_general_pipeline() {
        let mut chunker = TextChunker::new(ChunkerConfig::default());
        chunker.register_special_cleaner(
            "RSS_1500839292",
            Arc::new(|text: &str| text.replace("[NOISE]", "")),
        );
        let chunks = chunker.chunk("RSS_1500839292", "hello [NOISE] world", "zh");
        assert_eq!(chunks, vec!["hello world".to_string()]);

        let unaffected = chunker.chunk("RSS_other", "hello [NOISE] world", "zh");
        assert_eq!(unaffected, vec!["hello [NOISE] world".to_string()]);
    }
}
