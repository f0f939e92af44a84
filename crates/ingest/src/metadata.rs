//! Metadata Resolver (§4.D): joins a chunk's `(podcast_id,
//! episode_title_hint, ep_number_hint)` to the full episode/podcast
//! attribute bundle via a read-only SQL store (§6: `podcasts` joined to
//! `episodes` on `podcast_id`).

use podwise_core::{
    chunk::{truncate, UNKNOWN},
    Error, MatchTier, MetadataStore, ResolvedEpisode, Result,
};
use std::collections::HashSet;

/// Candidate episode row as read off the metadata store, before the
/// 3-tier match is applied.
#[derive(Debug, Clone)]
pub struct EpisodeRow {
    pub episode_id: i64,
    pub podcast_id: i64,
    pub podcast_name: String,
    pub author: String,
    pub category: String,
    pub apple_rating: i64,
    pub episode_title: String,
    pub duration: Option<String>,
    pub published_date: Option<String>,
    pub language: String,
}

/// Minimal query surface the resolver needs from the metadata store,
/// kept separate from [`MetadataStore`] so the matching algorithm below
/// can be unit-tested against an in-memory fixture instead of a live
/// `sqlx::PgPool`.
#[async_trait::async_trait]
pub trait EpisodeRowSource: Send + Sync {
    async fn episodes_for_podcast(&self, podcast_id: i64) -> Result<Vec<EpisodeRow>>;
}

pub struct MetadataResolver<S: EpisodeRowSource> {
    source: S,
}

impl<S: EpisodeRowSource> MetadataResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The 3-tier cascade of §4.D, run over every candidate row for the
    /// podcast. Falls back to a podcast-level aggregate with
    /// `episode_id = 0` when nothing matches or the source has no rows
    /// for the podcast at all.
    pub async fn resolve(
        &self,
        podcast_id: i64,
        episode_title_hint: &str,
        ep_number_hint: Option<&str>,
    ) -> Result<ResolvedEpisode> {
        let rows = self.source.episodes_for_podcast(podcast_id).await?;
        if rows.is_empty() {
            return Ok(podcast_fallback(podcast_id, None, &[]));
        }

        if let Some(row) = exact_title_match(&rows, episode_title_hint) {
            return Ok(to_resolved(row, MatchTier::ExactTitle));
        }

        if let Some(hint) = ep_number_hint.or_else(|| extract_ep_token(episode_title_hint)) {
            if let Some(row) = episode_number_match(&rows, hint) {
                return Ok(to_resolved(row, MatchTier::EpisodeNumber));
            }
        } else if let Some(token) = extract_ep_token(episode_title_hint) {
            if let Some(row) = episode_number_match(&rows, token) {
                return Ok(to_resolved(row, MatchTier::EpisodeNumber));
            }
        }

        if let Some(row) = fuzzy_title_match(&rows, episode_title_hint) {
            return Ok(to_resolved(row, MatchTier::FuzzyTitle));
        }

        Ok(podcast_fallback(podcast_id, rows.first(), &rows))
    }
}

fn to_resolved(row: &EpisodeRow, tier: MatchTier) -> ResolvedEpisode {
    ResolvedEpisode {
        episode_id: row.episode_id,
        podcast_id: row.podcast_id,
        podcast_name: truncate(&row.podcast_name, 255),
        author: truncate(&row.author, 255),
        category: truncate(&row.category, 64),
        apple_rating: row.apple_rating,
        episode_title: truncate(&row.episode_title, 255),
        duration: truncate(row.duration.as_deref().unwrap_or(UNKNOWN), 255),
        published_date: truncate(row.published_date.as_deref().unwrap_or(UNKNOWN), 64),
        language: truncate(&row.language, 16),
        matched_tier: tier,
    }
}

/// 1. Exact title match scoped to `podcast_id`.
fn exact_title_match<'a>(rows: &'a [EpisodeRow], title_hint: &str) -> Option<&'a EpisodeRow> {
    rows.iter().find(|r| r.episode_title == title_hint)
}

/// 2. Episode-number token match (e.g. "EP123").
fn episode_number_match<'a>(rows: &'a [EpisodeRow], token: &str) -> Option<&'a EpisodeRow> {
    rows.iter()
        .find(|r| extract_ep_token(&r.episode_title).is_some_and(|t| t.eq_ignore_ascii_case(token)))
}

/// 3. Normalized-title fuzzy match: whitespace-removed, lowercased,
/// Jaccard overlap of character sets >= 0.3; among matches, prefer rows
/// with both duration and published_date populated.
fn fuzzy_title_match<'a>(rows: &'a [EpisodeRow], title_hint: &str) -> Option<&'a EpisodeRow> {
    let normalized_hint = normalize_title(title_hint);
    if normalized_hint.is_empty() {
        return None;
    }

    let mut best: Option<(&EpisodeRow, f64, bool)> = None;
    for row in rows {
        let normalized_row = normalize_title(&row.episode_title);
        let score = jaccard_similarity(&normalized_hint, &normalized_row);
        if score < 0.3 {
            continue;
        }
        let complete = row.duration.is_some() && row.published_date.is_some();
        let better = match &best {
            None => true,
            Some((_, best_score, best_complete)) => {
                (complete && !best_complete) || (complete == *best_complete && score > *best_score)
            }
        };
        if better {
            best = Some((row, score, complete));
        }
    }
    best.map(|(row, _, _)| row)
}

/// A podcast-level fallback: podcast name/author/category from the first
/// available row, average duration and earliest published_date across
/// all rows for the podcast, `episode_id = 0` so downstream queries can
/// distinguish resolved from unresolved rows (§9 open-question
/// resolution).
fn podcast_fallback(podcast_id: i64, sample: Option<&EpisodeRow>, rows: &[EpisodeRow]) -> ResolvedEpisode {
    let podcast_name = sample.map(|r| r.podcast_name.clone()).unwrap_or_else(|| UNKNOWN.to_string());
    let author = sample.map(|r| r.author.clone()).unwrap_or_else(|| UNKNOWN.to_string());
    let category = sample.map(|r| r.category.clone()).unwrap_or_else(|| UNKNOWN.to_string());
    let apple_rating = sample.map(|r| r.apple_rating).unwrap_or(0);
    let language = sample.map(|r| r.language.clone()).unwrap_or_else(|| "zh".to_string());

    let earliest_published = rows
        .iter()
        .filter_map(|r| r.published_date.as_deref())
        .min()
        .unwrap_or(UNKNOWN)
        .to_string();

    ResolvedEpisode {
        episode_id: 0,
        podcast_id,
        podcast_name: truncate(&podcast_name, 255),
        author: truncate(&author, 255),
        category: truncate(&category, 64),
        apple_rating,
        episode_title: UNKNOWN.to_string(),
        duration: truncate(&average_duration(rows), 255),
        published_date: truncate(&earliest_published, 64),
        language: truncate(&language, 16),
        matched_tier: MatchTier::PodcastFallback,
    }
}

/// Average duration across the podcast (§4.D): parse the numeric portion
/// of every row's `duration` and mean it, rendered as whole minutes. Rows
/// whose `duration` carries no parseable number are excluded from the
/// mean; if none parse at all, fall back to the modal duration string
/// (ties broken by first occurrence), and to the `UNKNOWN` sentinel only
/// when every row's duration is null.
fn average_duration(rows: &[EpisodeRow]) -> String {
    let durations: Vec<&str> = rows.iter().filter_map(|r| r.duration.as_deref()).collect();
    if durations.is_empty() {
        return UNKNOWN.to_string();
    }

    let numeric: Vec<f64> = durations
        .iter()
        .filter_map(|d| DURATION_NUM.find(d).and_then(|m| m.as_str().parse::<f64>().ok()))
        .collect();
    if !numeric.is_empty() {
        let avg = numeric.iter().sum::<f64>() / numeric.len() as f64;
        return format!("{}分鐘", avg.round() as i64);
    }

    modal_duration(&durations).to_string()
}

fn modal_duration<'a>(durations: &[&'a str]) -> &'a str {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for d in durations {
        match counts.iter_mut().find(|(v, _)| v == d) {
            Some(entry) => entry.1 += 1,
            None => counts.push((d, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(v, _)| v)
        .unwrap_or(durations[0])
}

/// Whitespace-removed (including full-width space), lowercased.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{3000}')
        .collect::<String>()
        .to_lowercase()
}

/// Jaccard overlap of the two strings' character sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<char> = a.chars().collect();
    let set_b: HashSet<char> = b.chars().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

static EP_TOKEN: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)EP\d+").unwrap());

static DURATION_NUM: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\d+(\.\d+)?").unwrap());

/// Extracts an `EP<digits>`-style token from a string, case-insensitively.
pub fn extract_ep_token(text: &str) -> Option<&str> {
    EP_TOKEN.find(text).map(|m| m.as_str())
}

/// A `sqlx`-backed [`EpisodeRowSource`] over the read-only
/// `podcasts`/`episodes` relations (§6).
pub struct PgEpisodeRowSource {
    pool: sqlx::PgPool,
}

impl PgEpisodeRowSource {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EpisodeRowSource for PgEpisodeRowSource {
    async fn episodes_for_podcast(&self, podcast_id: i64) -> Result<Vec<EpisodeRow>> {
        let rows = sqlx::query_as::<_, PgEpisodeRecord>(
            r#"
            SELECT
                e.episode_id,
                e.podcast_id,
                p.podcast_name,
                p.author,
                p.category,
                p.apple_rating,
                e.episode_title,
                e.duration,
                e.published_date,
                e.languages AS language
            FROM episodes e
            JOIN podcasts p ON e.podcast_id = p.podcast_id
            WHERE e.podcast_id = $1
            "#,
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::resource(format!("metadata store query failed: {e}")))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct PgEpisodeRecord {
    episode_id: i64,
    podcast_id: i64,
    podcast_name: String,
    author: String,
    category: String,
    apple_rating: i32,
    episode_title: String,
    duration: Option<String>,
    published_date: Option<String>,
    language: Option<String>,
}

impl From<PgEpisodeRecord> for EpisodeRow {
    fn from(r: PgEpisodeRecord) -> Self {
        Self {
            episode_id: r.episode_id,
            podcast_id: r.podcast_id,
            podcast_name: r.podcast_name,
            author: r.author,
            category: r.category,
            apple_rating: r.apple_rating as i64,
            episode_title: r.episode_title,
            duration: r.duration,
            published_date: r.published_date,
            language: r.language.unwrap_or_else(|| "zh".to_string()),
        }
    }
}

/// Blanket [`MetadataStore`] impl so ingestion can depend on the trait
/// object rather than the concrete resolver type.
#[async_trait::async_trait]
impl<S: EpisodeRowSource> MetadataStore for MetadataResolver<S> {
    async fn resolve_episode(
        &self,
        podcast_id: i64,
        episode_title_hint: &str,
        ep_number_hint: Option<&str>,
    ) -> Result<ResolvedEpisode> {
        self.resolve(podcast_id, episode_title_hint, ep_number_hint).await
    }
}
