//! The seam between the knowledge base and whichever vector database backs it.

use async_trait::async_trait;
use helpdesk_core::error::Result;
use serde::{Deserialize, Serialize};

/// Payload stored next to every chunk embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub title: String,
    pub content: String,
    pub category: String,
    /// Id of the owning document; searches filter and group on it.
    pub source: String,
    pub chunk_index: usize,
    pub document_id: String,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// `{document_id}_chunk_{index}`
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Exact-match restrictions on chunk metadata. Empty means no filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkFilter {
    pub category: Option<String>,
    pub source: Option<String>,
}

impl ChunkFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.source.is_none()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.category.as_deref().map_or(true, |c| c == metadata.category)
            && self.source.as_deref().map_or(true, |s| s == metadata.source)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub index_name: String,
    pub vector_count: u64,
    pub dimension: u64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Creates the index when missing. Returns `true` if it was created.
    async fn ensure_index(&self) -> Result<bool>;

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    async fn query(&self, vector: Vec<f32>, top_k: u64, filter: Option<&ChunkFilter>) -> Result<Vec<VectorMatch>>;

    /// Ids of all stored records whose id starts with `prefix`.
    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete_ids(&self, ids: &[String]) -> Result<()>;

    async fn stats(&self) -> Result<IndexStats>;
}
