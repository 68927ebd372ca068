//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the boundary to whatever stores embeddings
//! (SQLite in the app crate, [`memory::InMemoryVectorIndex`] in tests).
//!
//! Tenant isolation is enforced by the type of the filter: every query and
//! bulk delete takes a [`VectorFilter`] whose `company_id` is mandatory,
//! and implementations must apply it *before* ranking and top-K
//! truncation, never as a post-filter.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::DataType;

/// Longest content preview stored alongside a vector. The full text stays
/// in the relational store.
pub const CONTENT_PREVIEW_CHARS: usize = 1000;

/// Metadata stored next to each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMetadata {
    pub document_id: String,
    pub company_id: String,
    pub title: String,
    pub content_preview: String,
    pub data_type: DataType,
    pub source_url: Option<String>,
}

/// A vector to upsert. `id` is the knowledge entry id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A similarity hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
    pub metadata: VectorMetadata,
}

/// Exact-match metadata filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorFilter {
    pub company_id: String,
    pub document_id: Option<String>,
}

impl VectorFilter {
    pub fn company(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            document_id: None,
        }
    }

    pub fn document(company_id: &str, document_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            document_id: Some(document_id.to_string()),
        }
    }

    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        metadata.company_id == self.company_id
            && self
                .document_id
                .as_deref()
                .map_or(true, |doc| metadata.document_id == doc)
    }
}

/// Storage for `(id, vector, metadata)` triples with top-K cosine search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` matches, best first, restricted to `filter`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Insert or replace records by id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Delete a single record by id. Missing ids are not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every record matching `filter`, returning how many were removed.
    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize>;
}

/// Truncate `content` to [`CONTENT_PREVIEW_CHARS`] characters.
pub fn content_preview(content: &str) -> String {
    truncate_chars(content, CONTENT_PREVIEW_CHARS)
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
