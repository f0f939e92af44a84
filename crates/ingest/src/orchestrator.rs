//! Ingestion Orchestrator (§4.F): drives A-E across collections with a
//! bounded worker pool, resumable progress, and a dual error journal.

use crate::source::{RawDocument, TranscriptSource};
use crate::IngestError;
use podwise_core::{
    chunk::UNKNOWN, Chunk, Embedder, Error, ErrorRecord, ErrorStage, IngestStats, MetadataStore,
    ProgressRecord, Result, VectorStore,
};
use podwise_lexicon::TagRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use crate::chunker::TextChunker;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cycle_size: usize,
    pub concurrent_workers: usize,
    pub retry_attempts: u32,
    pub chunk_limit_per_collection: Option<usize>,
    pub progress_path: PathBuf,
    pub error_journal_json_path: PathBuf,
    pub error_journal_csv_path: PathBuf,
    pub source_model: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_size: 5,
            concurrent_workers: 4,
            retry_attempts: 3,
            chunk_limit_per_collection: None,
            progress_path: PathBuf::from("state/ingest_progress.json"),
            error_journal_json_path: PathBuf::from("state/ingest_errors.jsonl"),
            error_journal_csv_path: PathBuf::from("state/ingest_errors.csv"),
            source_model: "bge-m3".to_string(),
        }
    }
}

enum WorkerEvent {
    DocumentDone {
        collection_id: String,
        file: String,
        chunks_written: u64,
    },
    CollectionDone {
        collection_id: String,
    },
    Error(ErrorRecord),
}

pub struct IngestionOrchestrator<TS, VS, MS, EM> {
    source: Arc<TS>,
    vector_store: Arc<VS>,
    metadata_store: Arc<MS>,
    embedder: Arc<EM>,
    lexicon: Arc<TagRegistry>,
    chunker: Arc<TextChunker>,
    config: OrchestratorConfig,
}

impl<TS, VS, MS, EM> IngestionOrchestrator<TS, VS, MS, EM>
where
    TS: TranscriptSource + 'static,
    VS: VectorStore + 'static,
    MS: MetadataStore + 'static,
    EM: Embedder + 'static,
{
    pub fn new(
        source: Arc<TS>,
        vector_store: Arc<VS>,
        metadata_store: Arc<MS>,
        embedder: Arc<EM>,
        lexicon: Arc<TagRegistry>,
        chunker: Arc<TextChunker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            source,
            vector_store,
            metadata_store,
            embedder,
            lexicon,
            chunker,
            config,
        }
    }

    /// One-shot mode: process all collections in a single pass.
    pub async fn run_one_shot(&self) -> Result<IngestStats> {
        let collections = self.source.list_collections().await?;
        self.run_collections(&collections, 0).await
    }

    /// Cycle mode: process at most `cycle_size` collections per run,
    /// advancing the progress record's cycle counter. Resumes from the
    /// collections not yet in `completed_collections`.
    pub async fn run_cycle(&self) -> Result<IngestStats> {
        let all_collections = self.source.list_collections().await?;
        let progress = self.load_progress().await?;
        let pending: Vec<String> = all_collections
            .into_iter()
            .filter(|c| !progress.is_collection_done(c))
            .take(self.config.cycle_size)
            .collect();
        self.run_collections(&pending, progress.current_cycle + 1).await
    }

    async fn run_collections(&self, collections: &[String], cycle: u64) -> Result<IngestStats> {
        let progress = Arc::new(tokio::sync::Mutex::new(self.load_progress().await?));
        let mut stats = IngestStats {
            cycle,
            ..Default::default()
        };

        let done_files: Arc<std::collections::BTreeSet<String>> = Arc::new(
            progress.lock().await.processed_files.clone(),
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_workers.max(1)));
        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(256);

        let mut handles = Vec::new();
        for collection_id in collections {
            let collection_id = collection_id.clone();
            let progress_check = progress.clone();
            {
                let p = progress_check.lock().await;
                if p.is_collection_done(&collection_id) {
                    continue;
                }
            }

            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let orchestrator = self.clone_handles();
            let done_files = done_files.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                orchestrator.process_collection(&collection_id, &done_files, tx).await;
            }));
        }
        drop(tx);

        let error_sink = ErrorJournalSink::new(
            self.config.error_journal_json_path.clone(),
            self.config.error_journal_csv_path.clone(),
        );

        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::DocumentDone {
                    collection_id,
                    file,
                    chunks_written,
                } => {
                    let mut p = progress.lock().await;
                    p.mark_file_done(&file, chunks_written);
                    self.save_progress(&p)
                        .await
                        .map_err(|e| Error::invariant(e.to_string()))?;
                    let entry = stats.collections.entry(collection_id).or_default();
                    entry.documents_processed += 1;
                    entry.chunks_written += chunks_written;
                }
                WorkerEvent::CollectionDone { collection_id } => {
                    let mut p = progress.lock().await;
                    p.mark_collection_done(&collection_id);
                    p.current_cycle = cycle;
                    p.cycle_count += 1;
                    self.save_progress(&p)
                        .await
                        .map_err(|e| Error::invariant(e.to_string()))?;
                }
                WorkerEvent::Error(record) => {
                    let entry = stats.collections.entry(record.collection_id.clone()).or_default();
                    entry.documents_failed += 1;
                    error_sink.record(record).await?;
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(stats)
    }

    /// Cheap clone of the handles this orchestrator needs inside a spawned
    /// task, without requiring `Self: Clone` on the generic config field.
    fn clone_handles(&self) -> WorkerContext<TS, VS, MS, EM> {
        WorkerContext {
            source: self.source.clone(),
            vector_store: self.vector_store.clone(),
            metadata_store: self.metadata_store.clone(),
            embedder: self.embedder.clone(),
            lexicon: self.lexicon.clone(),
            chunker: self.chunker.clone(),
            config: self.config.clone(),
        }
    }

    async fn load_progress(&self) -> Result<ProgressRecord> {
        let path = self.config.progress_path.clone();
        let loaded: std::result::Result<ProgressRecord, IngestError> =
            tokio::task::spawn_blocking(move || {
                if !path.exists() {
                    return Ok(ProgressRecord::default());
                }
                let data = std::fs::read_to_string(&path)
                    .map_err(|e| IngestError::ProgressIo(e.to_string()))?;
                serde_json::from_str(&data).map_err(|e| IngestError::ProgressIo(e.to_string()))
            })
            .await
            .map_err(|e| Error::invariant(format!("progress load task panicked: {e}")))?;
        loaded.map_err(Into::into)
    }

    async fn save_progress(&self, progress: &ProgressRecord) -> Result<()> {
        let mut progress = progress.clone();
        progress.last_updated = chrono::Utc::now().to_rfc3339();
        let path = self.config.progress_path.clone();
        tokio::task::spawn_blocking(move || atomic_write_json(&path, &progress))
            .await
            .map_err(|e| Error::invariant(format!("progress save task panicked: {e}")))?
    }
}

/// A per-spawn bundle of the shared handles, carried into worker tasks.
struct WorkerContext<TS, VS, MS, EM> {
    source: Arc<TS>,
    vector_store: Arc<VS>,
    metadata_store: Arc<MS>,
    embedder: Arc<EM>,
    lexicon: Arc<TagRegistry>,
    chunker: Arc<TextChunker>,
    config: OrchestratorConfig,
}

impl<TS, VS, MS, EM> WorkerContext<TS, VS, MS, EM>
where
    TS: TranscriptSource,
    VS: VectorStore,
    MS: MetadataStore,
    EM: Embedder,
{
    async fn process_collection(
        &self,
        collection_id: &str,
        done_files: &std::collections::BTreeSet<String>,
        tx: mpsc::Sender<WorkerEvent>,
    ) {
        let documents = match self.source.list_documents(collection_id).await {
            Ok(docs) => docs,
            Err(e) => {
                let _ = tx
                    .send(WorkerEvent::Error(error_record(
                        collection_id,
                        "",
                        "",
                        "ResourceError",
                        ErrorStage::Fetch,
                        e.to_string(),
                    )))
                    .await;
                return;
            }
        };

        let podcast_id = TS::podcast_id_of(collection_id).unwrap_or(0);

        for document in documents {
            if done_files.contains(&document.file) {
                continue;
            }
            match self.process_document(collection_id, podcast_id, &document).await {
                Ok(chunks_written) if chunks_written > 0 => {
                    let _ = tx
                        .send(WorkerEvent::DocumentDone {
                            collection_id: collection_id.to_string(),
                            file: document.file.clone(),
                            chunks_written,
                        })
                        .await;
                }
                Ok(_) => {
                    let _ = tx
                        .send(WorkerEvent::Error(error_record(
                            collection_id,
                            &podcast_id.to_string(),
                            &document.episode_title_hint,
                            "DataError",
                            ErrorStage::Write,
                            "document produced no writable chunks",
                        )))
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(WorkerEvent::Error(error_record(
                            collection_id,
                            &podcast_id.to_string(),
                            &document.episode_title_hint,
                            "DataError",
                            ErrorStage::Metadata,
                            e.to_string(),
                        )))
                        .await;
                }
            }
        }

        let _ = tx
            .send(WorkerEvent::CollectionDone {
                collection_id: collection_id.to_string(),
            })
            .await;
    }

    /// Returns the number of chunks successfully written. A document is
    /// "processed" only if at least one chunk writes successfully
    /// (§4.F); a metadata-completeness failure aborts the document, not
    /// the run.
    async fn process_document(
        &self,
        collection_id: &str,
        podcast_id: i64,
        document: &RawDocument,
    ) -> Result<u64> {
        let text = document.text_for_chunking();
        let pieces = self.chunker.chunk(collection_id, &text, &document.language);
        if pieces.is_empty() {
            return Ok(0);
        }

        let metadata = retry_with_backoff(self.config.retry_attempts, || {
            self.metadata_store.resolve_episode(
                podcast_id,
                &document.episode_title_hint,
                document.ep_number_hint.as_deref(),
            )
        })
        .await?;

        if metadata.episode_id != 0 && !metadata_is_complete(&metadata) {
            return Err(IngestError::IncompleteMetadata(document.file.clone()).into());
        }

        let limit = self.config.chunk_limit_per_collection.unwrap_or(usize::MAX);
        let mut written = 0u64;
        let created_at = chrono::Utc::now().to_rfc3339();

        for (index, chunk_text) in pieces.into_iter().take(limit).enumerate() {
            if chunk_text.trim().is_empty() {
                continue;
            }

            let tags = self.lexicon.resolve(&chunk_text);

            let embedding = retry_with_backoff(self.config.retry_attempts, || {
                self.embedder.embed(&[chunk_text.clone()])
            })
            .await
            .map(|mut v| v.pop().unwrap_or_default())
            .unwrap_or_else(|_| vec![0.0; podwise_core::EMBEDDING_DIM]);

            let chunk_id = format!("{}_{}", document.file, index);
            let chunk = Chunk::build(
                chunk_id,
                index as i64,
                chunk_text,
                embedding,
                metadata.episode_id,
                podcast_id,
                metadata.podcast_name.clone(),
                metadata.episode_title.clone(),
                metadata.author.clone(),
                metadata.category.clone(),
                metadata.duration.clone(),
                metadata.published_date.clone(),
                metadata.apple_rating,
                metadata.language.clone(),
                created_at.clone(),
                self.config.source_model.clone(),
                &tags,
            );

            if chunk.chunk_text.is_empty() {
                continue;
            }

            let write_result = retry_with_backoff(self.config.retry_attempts, || {
                self.vector_store.upsert(std::slice::from_ref(&chunk))
            })
            .await;

            if write_result.is_ok() {
                written += 1;
            }
        }

        if written > 0 {
            self.vector_store.flush().await?;
        }

        Ok(written)
    }
}

/// Required fields (§3) must be non-sentinel for the document to pass the
/// metadata-completeness gate (§4.F), except `tags` which is allowed to
/// be empty.
fn metadata_is_complete(metadata: &podwise_core::ResolvedEpisode) -> bool {
    metadata.podcast_name != UNKNOWN
        && metadata.author != UNKNOWN
        && metadata.category != UNKNOWN
        && metadata.duration != UNKNOWN
        && metadata.published_date != UNKNOWN
}

/// Exponential backoff (1s/2s/4s) over up to `attempts` tries, for the
/// transient resource errors named in §5's suspension points.
async fn retry_with_backoff<F, Fut, T>(attempts: u32, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = Duration::from_secs(1);
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                tracing::warn!(attempt, error = %e, "retrying after backoff");
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::resource("retry loop exhausted with no error recorded")))
}

fn error_record(
    collection_id: &str,
    rss_id: &str,
    title: &str,
    error_type: &str,
    stage: ErrorStage,
    message: impl Into<String>,
) -> ErrorRecord {
    ErrorRecord {
        collection_id: collection_id.to_string(),
        rss_id: rss_id.to_string(),
        title: title.to_string(),
        error_type: error_type.to_string(),
        stage,
        message: message.into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Write-temp-then-rename: the progress file is never observed half
/// written (§4.F, §6).
fn atomic_write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    std::fs::write(&tmp_path, data).map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    std::fs::rename(&tmp_path, path).map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    Ok(())
}

/// Dual JSON-lines + CSV error journal, written side by side (§4.F, §6).
struct ErrorJournalSink {
    json_path: PathBuf,
    csv_path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl ErrorJournalSink {
    fn new(json_path: PathBuf, csv_path: PathBuf) -> Self {
        Self {
            json_path,
            csv_path,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn record(&self, record: ErrorRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let json_path = self.json_path.clone();
        let csv_path = self.csv_path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = json_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let json_line = serde_json::to_string(&record).unwrap_or_default();
            append_line(&json_path, &json_line)?;

            let csv_is_new = !csv_path.exists();
            if csv_is_new {
                append_line(&csv_path, ErrorRecord::csv_header())?;
            }
            append_line(&csv_path, &record.to_csv_row())?;
            Ok::<(), IngestError>(())
        })
        .await
        .map_err(|e| Error::invariant(format!("error journal task panicked: {e}")))?
        .map_err(Into::into)
    }
}

fn append_line(path: &PathBuf, line: &str) -> std::result::Result<(), IngestError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    writeln!(file, "{line}").map_err(|e| IngestError::ProgressIo(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_completeness_requires_non_sentinel_fields() {
        let complete = podwise_core::ResolvedEpisode {
            episode_id: 1,
            podcast_id: 1,
            podcast_name: "pod".into(),
            author: "auth".into(),
            category: "商業".into(),
            apple_rating: 5,
            episode_title: "ep".into(),
            duration: "30m".into(),
            published_date: "2024-01-01".into(),
            language: "zh".into(),
            matched_tier: podwise_core::MatchTier::ExactTitle,
        };
        assert!(metadata_is_complete(&complete));

        let mut incomplete = complete.clone();
        incomplete.duration = UNKNOWN.to_string();
        assert!(!metadata_is_complete(&incomplete));
    }

    #[tokio::test]
    async fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut progress = ProgressRecord::default();
        progress.mark_file_done("a.json", 3);
        atomic_write_json(&path, &progress).unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let reloaded: ProgressRecord = serde_json::from_str(&data).unwrap();
        assert!(reloaded.is_file_done("a.json"));
    }

    #[tokio::test]
    async fn retry_with_backoff_gives_up_after_attempts() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: Result<()> = retry_with_backoff(2, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(Error::resource("still down"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_with_backoff_does_not_retry_non_retryable() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: Result<()> = retry_with_backoff(3, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(Error::data("bad data"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
