use crate::vector::{ChunkFilter, IndexStats, VectorIndex, VectorMatch, VectorRecord};
use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process vector index with brute-force cosine search.
///
/// Selected with `VECTOR_BACKEND=memory`; contents are lost on restart.
pub struct MemoryIndex {
    name: String,
    dimension: u64,
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>, dimension: u64) -> Self {
        Self {
            name: name.into(),
            dimension,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_index(&self) -> Result<bool> {
        Ok(false)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut store = self.records.write().await;
        for record in records {
            if record.values.len() as u64 != self.dimension {
                return Err(HelpdeskError::VectorStore(format!(
                    "Vector {} has dimension {}, index expects {}",
                    record.id,
                    record.values.len(),
                    self.dimension
                )));
            }
            store.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: u64, filter: Option<&ChunkFilter>) -> Result<Vec<VectorMatch>> {
        let store = self.records.read().await;
        let mut matches: Vec<VectorMatch> = store
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine(&vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k as usize);
        Ok(matches)
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        let store = self.records.read().await;
        Ok(store.keys().filter(|id| id.starts_with(prefix)).cloned().collect())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let mut store = self.records.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            index_name: self.name.clone(),
            vector_count: self.records.read().await.len() as u64,
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkMetadata;

    fn record(doc: &str, index: usize, values: Vec<f32>, category: &str) -> VectorRecord {
        VectorRecord {
            id: format!("{}_chunk_{}", doc, index),
            values,
            metadata: ChunkMetadata {
                title: doc.to_string(),
                content: format!("chunk {}", index),
                category: category.to_string(),
                source: doc.to_string(),
                chunk_index: index,
                document_id: doc.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_and_filters() {
        let index = MemoryIndex::new("test", 2);
        index
            .upsert(vec![
                record("a", 0, vec![1.0, 0.0], "faq"),
                record("b", 0, vec![0.7, 0.7], "faq"),
                record("c", 0, vec![0.0, 1.0], "billing"),
            ])
            .await
            .unwrap();

        let all = index.query(vec![1.0, 0.1], 3, None).await.unwrap();
        assert_eq!(all[0].id, "a_chunk_0");
        assert_eq!(all[2].id, "c_chunk_0");

        let filter = ChunkFilter {
            category: Some("billing".into()),
            source: None,
        };
        let billing = index.query(vec![1.0, 0.0], 3, Some(&filter)).await.unwrap();
        assert_eq!(billing.len(), 1);
        assert_eq!(billing[0].metadata.source, "c");
    }

    #[tokio::test]
    async fn prefix_listing_does_not_cross_documents() {
        let index = MemoryIndex::new("test", 1);
        index
            .upsert(vec![
                record("doc-1", 0, vec![1.0], "x"),
                record("doc-1", 1, vec![1.0], "x"),
                record("doc-10", 0, vec![1.0], "x"),
            ])
            .await
            .unwrap();

        let ids = index.list_ids("doc-1_chunk_").await.unwrap();
        assert_eq!(ids, vec!["doc-1_chunk_0", "doc-1_chunk_1"]);

        index.delete_ids(&ids).await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let index = MemoryIndex::new("test", 3);
        let err = index.upsert(vec![record("a", 0, vec![1.0], "x")]).await.unwrap_err();
        assert!(matches!(err, HelpdeskError::VectorStore(_)));
    }
}
