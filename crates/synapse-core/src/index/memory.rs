//! In-memory [`VectorIndex`] for tests and embedded use.
//!
//! Brute-force cosine similarity over every stored vector that passes the
//! filter. Records are keyed by id, so upserts overwrite.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{VectorFilter, VectorIndex, VectorMatch, VectorRecord};

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a single record, if present.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;

        let mut matches: Vec<VectorMatch> = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values) as f64,
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        stored.remove(id);
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        let before = stored.len();
        stored.retain(|_, r| !filter.matches(&r.metadata));
        Ok(before - stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorMetadata;
    use crate::models::DataType;

    fn record(id: &str, company: &str, doc: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            values,
            metadata: VectorMetadata {
                document_id: doc.into(),
                company_id: company.into(),
                title: id.into(),
                content_preview: String::new(),
                data_type: DataType::Product,
                source_url: None,
            },
        }
    }

    #[tokio::test]
    async fn test_query_filters_before_top_k() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                record("other-1", "globex", "g1", vec![1.0, 0.0]),
                record("other-2", "globex", "g2", vec![1.0, 0.0]),
                record("mine", "acme", "a1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        // The globex vectors are closer, but must not crowd out acme's
        let hits = index
            .query(&[1.0, 0.0], 1, &VectorFilter::company("acme"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");
    }

    #[tokio::test]
    async fn test_query_sorted_desc() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                record("far", "acme", "d1", vec![0.0, 1.0]),
                record("near", "acme", "d2", vec![1.0, 0.1]),
            ])
            .await
            .unwrap();
        let hits = index
            .query(&[1.0, 0.0], 10, &VectorFilter::company("acme"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[record("e1", "acme", "d1", vec![1.0])])
            .await
            .unwrap();
        index
            .upsert(&[record("e1", "acme", "d1", vec![2.0])])
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("e1").unwrap().values, vec![2.0]);
    }

    #[tokio::test]
    async fn test_delete_by_filter_scoped_to_company() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                record("a", "acme", "d1", vec![1.0]),
                record("b", "acme", "d2", vec![1.0]),
                record("c", "globex", "d1", vec![1.0]),
            ])
            .await
            .unwrap();

        let removed = index
            .delete_by_filter(&VectorFilter::document("acme", "d1"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(index.get("a").is_none());
        assert!(index.get("c").is_some());

        index.delete("b").await.unwrap();
        index.delete("missing").await.unwrap();
        assert_eq!(index.len(), 1);
    }
}
