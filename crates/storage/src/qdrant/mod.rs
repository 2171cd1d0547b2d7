use crate::vector::{ChunkFilter, ChunkMetadata, IndexStats, VectorIndex, VectorMatch, VectorRecord};
use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use qdrant_client::prelude::{Payload, QdrantClient};
use qdrant_client::qdrant::{
    points_selector::PointsSelectorOneOf, value::Kind, vectors_config::Config, Condition,
    CreateCollection, Distance, Filter, PointId, PointStruct, PointsIdsList, PointsSelector,
    ScrollPoints, SearchPoints, Value, VectorParams, VectorsConfig,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_COLLECTION: &str = "kvn-knowledge-base";
pub const DEFAULT_DIM: u64 = 1536;
const SCROLL_PAGE: u32 = 256;
const CHUNK_SUFFIX: &str = "_chunk_";

pub struct QdrantStorage {
    client: Arc<QdrantClient>,
    collection: String,
    dimension: u64,
}

impl QdrantStorage {
    pub fn new(url: &str, api_key: Option<&str>, collection: impl Into<String>, dimension: u64) -> Result<Self> {
        let mut config = QdrantClient::from_url(url);
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        let client = config
            .build()
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            collection: collection.into(),
            dimension,
        })
    }

    fn calculate_stable_id(chunk_id: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(chunk_id);
        let result = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&result[..8]);
        u64::from_le_bytes(bytes)
    }

    fn build_filter(filter: &ChunkFilter) -> Filter {
        let mut conditions = Vec::new();
        if let Some(category) = &filter.category {
            conditions.push(Condition::matches("category", category.clone()));
        }
        if let Some(source) = &filter.source {
            conditions.push(Condition::matches("source", source.clone()));
        }
        Filter::must(conditions)
    }

    fn to_payload(record: &VectorRecord) -> Payload {
        let meta = &record.metadata;
        let mut payload = Payload::new();
        payload.insert("chunkId", record.id.clone());
        payload.insert("title", meta.title.clone());
        payload.insert("content", meta.content.clone());
        payload.insert("category", meta.category.clone());
        payload.insert("source", meta.source.clone());
        payload.insert("chunkIndex", meta.chunk_index as i64);
        payload.insert("documentId", meta.document_id.clone());
        payload
    }

    fn string_field(payload: &HashMap<String, Value>, key: &str) -> String {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn from_payload(payload: &HashMap<String, Value>) -> ChunkMetadata {
        let chunk_index = match payload.get("chunkIndex").and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(i)) => *i as usize,
            Some(Kind::DoubleValue(d)) => *d as usize,
            _ => 0,
        };
        let document_id = Self::string_field(payload, "documentId");
        let source = Self::string_field(payload, "source");

        ChunkMetadata {
            title: Self::string_field(payload, "title"),
            content: Self::string_field(payload, "content"),
            category: Self::string_field(payload, "category"),
            source: if source.is_empty() { document_id.clone() } else { source },
            chunk_index,
            document_id,
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantStorage {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn ensure_index(&self) -> Result<bool> {
        let exists = self
            .client
            .has_collection(&self.collection)
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;
        if exists {
            return Ok(false);
        }

        info!("Creating collection: {}", self.collection);
        self.client
            .create_collection(&CreateCollection {
                collection_name: self.collection.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: self.dimension,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;
        Ok(true)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let points: Vec<PointStruct> = records
            .iter()
            .map(|r| {
                PointStruct::new(
                    Self::calculate_stable_id(&r.id),
                    r.values.clone(),
                    Self::to_payload(r),
                )
            })
            .collect();
        debug!(collection = %self.collection, count = points.len(), "Upserting points");

        self.client
            .upsert_points_blocking(&self.collection, None, points, None)
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: u64, filter: Option<&ChunkFilter>) -> Result<Vec<VectorMatch>> {
        let filter = filter.filter(|f| !f.is_empty()).map(Self::build_filter);
        let result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                filter,
                limit: top_k,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;

        Ok(result
            .result
            .into_iter()
            .map(|point| {
                let id = Self::string_field(&point.payload, "chunkId");
                VectorMatch {
                    id,
                    score: point.score,
                    metadata: Self::from_payload(&point.payload),
                }
            })
            .collect())
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        // `{doc}_chunk_` prefixes narrow the scan to that document's points.
        let filter = prefix
            .strip_suffix(CHUNK_SUFFIX)
            .map(|doc| Filter::must([Condition::matches("documentId", doc.to_string())]));

        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let page = self
                .client
                .scroll(&ScrollPoints {
                    collection_name: self.collection.clone(),
                    filter: filter.clone(),
                    offset: offset.take(),
                    limit: Some(SCROLL_PAGE),
                    with_payload: Some(true.into()),
                    ..Default::default()
                })
                .await
                .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;

            ids.extend(
                page.result
                    .iter()
                    .map(|p| Self::string_field(&p.payload, "chunkId"))
                    .filter(|id| id.starts_with(prefix)),
            );

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                ids: ids
                    .iter()
                    .map(|id| PointId::from(Self::calculate_stable_id(id)))
                    .collect(),
            })),
        };

        self.client
            .delete_points(&self.collection, None, &selector, None)
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| HelpdeskError::VectorStore(e.to_string()))?;

        Ok(IndexStats {
            index_name: self.collection.clone(),
            vector_count: info.result.and_then(|r| r.points_count).unwrap_or(0),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_ids_are_deterministic_per_chunk() {
        let a = QdrantStorage::calculate_stable_id("doc-1_chunk_0");
        assert_eq!(a, QdrantStorage::calculate_stable_id("doc-1_chunk_0"));
        assert_ne!(a, QdrantStorage::calculate_stable_id("doc-1_chunk_1"));
    }

    #[test]
    fn payload_round_trips_chunk_metadata() {
        let record = VectorRecord {
            id: "doc-1_chunk_2".into(),
            values: vec![0.0; 3],
            metadata: ChunkMetadata {
                title: "Passwords".into(),
                content: "Reset it.".into(),
                category: "faq".into(),
                source: "doc-1".into(),
                chunk_index: 2,
                document_id: "doc-1".into(),
            },
        };
        let payload: HashMap<String, Value> = QdrantStorage::to_payload(&record).into();
        assert_eq!(QdrantStorage::from_payload(&payload), record.metadata);
        assert_eq!(QdrantStorage::string_field(&payload, "chunkId"), "doc-1_chunk_2");
    }
}
