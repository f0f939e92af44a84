//! CSV-backed tag registry.
//!
//! Expected columns (case-insensitive header match, order irrelevant):
//! a column named `tag` (the canonical name), an optional `category`
//! column, and any number of additional columns treated as synonym
//! columns (historically up to 14). A row with an empty `tag` cell is
//! skipped and logged once; the file itself must parse or the process
//! aborts at init (§4.A).

use crate::LexiconError;
use podwise_core::Tag;
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only after [`TagRegistry::load`]. Safe to wrap in an `Arc` and
/// share across ingestion workers and query-time handlers.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    /// Tags in the order they appeared in the source table — resolution
    /// ties break on this order.
    tags: Vec<Tag>,
    /// Lowercased keyword (synonym or tag name) -> tag names it maps to,
    /// preserving the table-row order of those tag names.
    keyword_to_tags: BTreeMap<String, Vec<String>>,
}

impl TagRegistry {
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        if !path.exists() {
            return Err(LexiconError::FileNotFound(path.display().to_string()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| LexiconError::Read(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| LexiconError::Read(e.to_string()))?
            .clone();

        let tag_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("tag"))
            .ok_or(LexiconError::MissingTagColumn)?;
        let category_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("category"));

        let mut tags = Vec::new();
        let mut keyword_to_tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut warned_once = false;

        for (row_idx, record) in reader.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    if !warned_once {
                        tracing::warn!(row = row_idx, error = %e, "skipping malformed tag row");
                        warned_once = true;
                    }
                    continue;
                }
            };

            let name = record.get(tag_col).unwrap_or("").trim();
            if name.is_empty() {
                if !warned_once {
                    tracing::warn!(row = row_idx, "skipping tag row with empty name");
                    warned_once = true;
                }
                continue;
            }

            let category = category_col
                .and_then(|c| record.get(c))
                .unwrap_or("general")
                .trim();
            let category = if category.is_empty() { "general" } else { category };

            let mut tag = Tag::new(name, category);

            for (col_idx, cell) in record.iter().enumerate() {
                if col_idx == tag_col || Some(col_idx) == category_col {
                    continue;
                }
                let syn = cell.trim();
                if syn.is_empty() {
                    continue;
                }
                tag.synonyms.insert(syn.to_lowercase());
            }

            let normalized_name = name.to_lowercase();
            keyword_to_tags
                .entry(normalized_name.clone())
                .or_default()
                .push(name.to_string());
            for syn in &tag.synonyms {
                keyword_to_tags.entry(syn.clone()).or_default().push(name.to_string());
            }

            tags.push(tag);
        }

        Ok(Self { tags, keyword_to_tags })
    }

    /// Build a registry directly from already-parsed tags — used by tests
    /// and by callers that source the vocabulary from something other
    /// than a CSV file on disk.
    pub fn from_tags(tags: Vec<Tag>) -> Self {
        let mut keyword_to_tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for tag in &tags {
            keyword_to_tags
                .entry(tag.name.to_lowercase())
                .or_default()
                .push(tag.name.clone());
            for syn in &tag.synonyms {
                keyword_to_tags.entry(syn.clone()).or_default().push(tag.name.clone());
            }
        }
        Self { tags, keyword_to_tags }
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn row_order_index(&self, tag_name: &str) -> usize {
        self.tags
            .iter()
            .position(|t| t.name == tag_name)
            .unwrap_or(usize::MAX)
    }

    /// Resolve free text to a ranked list of 0..3 tag names (§4.A).
    ///
    /// Text is whitespace-normalized and lowercased; any synonym or tag
    /// name present as a substring is a candidate. A synonym mapping to
    /// multiple tags contributes all of them. Ties break on tag-table row
    /// order. The registry never invents a tag absent from the table —
    /// an empty result means no match, not a request to guess.
    pub fn resolve(&self, text: &str) -> Vec<String> {
        let normalized: String = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut candidates: Vec<String> = Vec::new();
        for (keyword, tag_names) in &self.keyword_to_tags {
            if normalized.contains(keyword.as_str()) {
                for name in tag_names {
                    if !candidates.contains(name) {
                        candidates.push(name.clone());
                    }
                }
            }
        }

        candidates.sort_by_key(|name| self.row_order_index(name));
        candidates.truncate(3);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwise_core::Tag;

    fn sample_registry() -> TagRegistry {
        let mut business = Tag::new("商業", "商業");
        business.synonyms.insert("投資".into());
        business.synonyms.insert("理財".into());

        let mut tech = Tag::new("科技", "科技");
        tech.synonyms.insert("ai".into());
        tech.synonyms.insert("投資".into()); // shared synonym across tags

        let mut edu = Tag::new("教育", "教育");
        edu.synonyms.insert("學習".into());

        TagRegistry::from_tags(vec![business, tech, edu])
    }

    #[test]
    fn resolves_tags_from_synonyms() {
        let reg = sample_registry();
        let tags = reg.resolve("如何做好投資理財規劃");
        assert!(tags.contains(&"商業".to_string()));
    }

    #[test]
    fn shared_synonym_yields_multiple_candidates_in_row_order() {
        let reg = sample_registry();
        let tags = reg.resolve("投資");
        assert_eq!(tags, vec!["商業".to_string(), "科技".to_string()]);
    }

    #[test]
    fn no_match_returns_empty_not_invented() {
        let reg = sample_registry();
        assert!(reg.resolve("完全不相關的內容").is_empty());
    }

    #[test]
    fn caps_at_three_tags() {
        let tags: Vec<Tag> = (0..7)
            .map(|i| {
                let mut t = Tag::new(format!("tag{i}"), "general");
                t.synonyms.insert("shared".into());
                t
            })
            .collect();
        let reg = TagRegistry::from_tags(tags);
        let resolved = reg.resolve("this text contains shared keyword");
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved, vec!["tag0", "tag1", "tag2"]);
    }

    #[test]
    fn missing_file_errors() {
        let err = TagRegistry::load(Path::new("/nonexistent/tags.csv")).unwrap_err();
        assert!(matches!(err, LexiconError::FileNotFound(_)));
    }

    #[test]
    fn loads_from_csv_with_tag_and_synonym_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.csv");
        std::fs::write(
            &path,
            "tag,category,synonym_1,synonym_2\n商業,商業,投資,理財\n科技,科技,ai,\n",
        )
        .unwrap();

        let reg = TagRegistry::load(&path).unwrap();
        assert_eq!(reg.tags().len(), 2);
        assert_eq!(reg.resolve("投資理財"), vec!["商業".to_string()]);
    }
}
