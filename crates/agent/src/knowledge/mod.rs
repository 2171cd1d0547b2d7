use ai::AiProvider;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use helpdesk_core::error::{Result, ResultExt};
use helpdesk_core::types::{DocumentMetadata, KnowledgeDocument};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use storage::sqlite::DocumentPage;
use storage::{ChunkFilter, ChunkMetadata, IndexStats, SqliteStorage, VectorIndex, VectorRecord};
use tracing::{info, instrument};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
const UPSERT_BATCH: usize = 100;
const EMBED_CONCURRENCY: usize = 4;
const DEFAULT_CATEGORY: &str = "general";

/// Splits text on `.`, `!` and `?` and packs sentences into chunks of at most
/// `max_size` characters, each ending in `.`. A sentence that cannot fit is
/// truncated into a chunk of its own.
pub fn split_into_chunks(content: &str, max_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    // room left for the closing "."
    let sentence_max = max_size.saturating_sub(1).max(1);

    let sentences = content
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for sentence in sentences {
        let mut len = sentence.chars().count();
        let sentence = if len > sentence_max {
            len = sentence_max;
            sentence.chars().take(sentence_max).collect::<String>()
        } else {
            sentence.to_string()
        };
        // ". " joins sentences; the closing "." is counted too.
        let grown = if current.is_empty() { len } else { current_len + 2 + len };
        if grown < max_size {
            if !current.is_empty() {
                current.push_str(". ");
            }
            current.push_str(&sentence);
            current_len = grown;
        } else {
            if !current.is_empty() {
                chunks.push(format!("{}.", current));
            }
            current = sentence;
            current_len = len;
        }
    }
    if !current.is_empty() {
        chunks.push(format!("{}.", current));
    }

    if chunks.is_empty() && !content.trim().is_empty() {
        chunks.push(content.chars().take(max_size).collect());
    }
    chunks
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    pub relevance: f32,
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub documents: Vec<SearchHit>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub index_name: String,
    pub stats: IndexStats,
}

/// Document store over the relational database plus the vector index.
pub struct KnowledgeBase {
    sqlite: Arc<SqliteStorage>,
    index: Arc<dyn VectorIndex>,
    ai: Arc<dyn AiProvider>,
    chunk_size: usize,
}

impl KnowledgeBase {
    pub fn new(sqlite: Arc<SqliteStorage>, index: Arc<dyn VectorIndex>, ai: Arc<dyn AiProvider>) -> Self {
        Self {
            sqlite,
            index,
            ai,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Stores the document, then embeds and indexes its chunks. Returns the
    /// number of chunks written. Chunks already upserted stay in the index
    /// if a later batch fails.
    #[instrument(skip(self, content, metadata), fields(document_id = %id))]
    pub async fn add_document(&self, id: &str, title: &str, content: &str, metadata: DocumentMetadata) -> Result<usize> {
        self.index_document(id, title, content, metadata)
            .await
            .context("add document")
    }

    async fn index_document(&self, id: &str, title: &str, content: &str, metadata: DocumentMetadata) -> Result<usize> {
        let now = Utc::now();
        let document = KnowledgeDocument {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: metadata.category.clone(),
            filename: metadata.filename,
            file_type: metadata.file_type,
            file_size: content.chars().count() as i64,
            is_active: true,
            chunk_count: None,
            created_at: now,
            updated_at: now,
        };
        self.sqlite.create_document(&document).await?;

        let chunks = split_into_chunks(content, self.chunk_size);
        let category = metadata.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let embedding_futures: Vec<_> = chunks.iter().map(|chunk| self.ai.generate_embedding(chunk)).collect();
        let embeddings: Vec<Vec<f32>> = stream::iter(embedding_futures)
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, values))| VectorRecord {
                id: format!("{}_chunk_{}", id, i),
                values,
                metadata: ChunkMetadata {
                    title: title.to_string(),
                    content: chunk.clone(),
                    category: category.clone(),
                    source: id.to_string(),
                    chunk_index: i,
                    document_id: id.to_string(),
                },
            })
            .collect();

        for batch in records.chunks(UPSERT_BATCH) {
            self.index.upsert(batch.to_vec()).await?;
        }

        self.sqlite.set_document_chunk_count(id, chunks.len() as i64).await?;
        info!("Document {} added to the knowledge base with {} chunks", title, chunks.len());
        Ok(chunks.len())
    }

    /// Best chunk per source document, highest relevance first.
    pub async fn search_similar(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<SearchResult> {
        self.search(query, limit, filter).await.context("search knowledge base")
    }

    async fn search(&self, query: &str, limit: usize, filter: Option<&ChunkFilter>) -> Result<SearchResult> {
        let vector = self.ai.generate_embedding(query).await?;
        let matches = self.index.query(vector, (limit * 3) as u64, filter).await?;

        let mut best: HashMap<String, SearchHit> = HashMap::new();
        for m in matches {
            let document_id = if m.metadata.source.is_empty() {
                m.metadata.document_id.clone()
            } else {
                m.metadata.source.clone()
            };
            if best.get(&document_id).map_or(true, |hit| hit.relevance < m.score) {
                best.insert(
                    document_id.clone(),
                    SearchHit {
                        id: document_id,
                        title: m.metadata.title,
                        content: m.metadata.content,
                        relevance: m.score,
                        category: m.metadata.category,
                    },
                );
            }
        }

        let mut documents: Vec<SearchHit> = best.into_values().collect();
        documents.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        documents.truncate(limit);

        Ok(SearchResult {
            total_results: documents.len(),
            documents,
        })
    }

    /// Removes the relational record first, then every `{id}_chunk_*` vector.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.sqlite.delete_document(id).await?;

        let chunk_ids = self
            .index
            .list_ids(&format!("{}_chunk_", id))
            .await
            .context("delete document")?;
        self.index
            .delete_ids(&chunk_ids)
            .await
            .context("delete document")?;

        info!(document_id = %id, chunks = chunk_ids.len(), "Removed document from the knowledge base");
        Ok(())
    }

    pub async fn list_documents(&self, page: i64, limit: i64, category: Option<&str>) -> Result<DocumentPage> {
        self.sqlite.list_documents(page, limit, category).await
    }

    pub async fn set_document_active(&self, id: &str, is_active: bool) -> Result<()> {
        self.sqlite.set_document_active(id, is_active).await
    }

    /// Indexes a small ad-hoc document under the `teste` category.
    pub async fn add_test_document(&self, text: &str, title: Option<&str>) -> Result<String> {
        let id = format!("doc-{}", Utc::now().timestamp_millis());
        let metadata = DocumentMetadata {
            category: Some("teste".into()),
            filename: Some("api-test.txt".into()),
            file_type: Some("text".into()),
        };
        self.add_document(&id, title.unwrap_or("Documento de teste"), text, metadata)
            .await?;
        Ok(id)
    }

    pub async fn ensure_index(&self) -> Result<bool> {
        self.index.ensure_index().await
    }

    pub async fn test_connection(&self) -> Result<ConnectionStatus> {
        let stats = self
            .index
            .stats()
            .await
            .context("connect to vector index")?;
        Ok(ConnectionStatus {
            connected: true,
            index_name: self.index.name().to_string(),
            stats,
        })
    }
}
