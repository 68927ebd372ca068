//! Hard per-call deadlines at the embedding and vector-index boundary.
//!
//! [`TimeoutEmbedder`] and [`TimeoutIndex`] wrap any implementation and turn
//! an elapsed deadline into [`EngineError::Timeout`].

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use synapse_core::embedding::Embedder;
use synapse_core::index::{VectorFilter, VectorIndex, VectorMatch, VectorRecord};
use synapse_core::EngineError;

async fn with_deadline<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            error!(operation, secs = limit.as_secs(), "deadline exceeded");
            Err(EngineError::Timeout {
                operation: operation.to_string(),
                secs: limit.as_secs(),
            }
            .into())
        }
    }
}

pub struct TimeoutEmbedder {
    inner: Arc<dyn Embedder>,
    limit: Duration,
}

impl TimeoutEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Embedder for TimeoutEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_deadline("embedding", self.limit, self.inner.embed(text)).await
    }
}

pub struct TimeoutIndex {
    inner: Arc<dyn VectorIndex>,
    limit: Duration,
}

impl TimeoutIndex {
    pub fn new(inner: Arc<dyn VectorIndex>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl VectorIndex for TimeoutIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        with_deadline("vector query", self.limit, self.inner.query(vector, top_k, filter)).await
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        with_deadline("vector upsert", self.limit, self.inner.upsert(records)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_deadline("vector delete", self.limit, self.inner.delete(id)).await
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize> {
        with_deadline("vector delete", self.limit, self.inner.delete_by_filter(filter)).await
    }
}
