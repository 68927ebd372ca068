//! Authority-weighted semantic retrieval.
//!
//! A query is embedded, the vector index is searched within the caller's
//! company, and every hit is enriched from the relational store:
//!
//! 1. The backing [`Document`] is fetched. Missing or excluded documents
//!    drop the hit, even if a stale vector is still indexed.
//! 2. The [`KnowledgeEntry`] supplies the authority weight (defaulting to
//!    [`DEFAULT_AUTHORITY_WEIGHT`] when the entry is gone).
//! 3. Results are ordered by `relevance × authority`, descending, with
//!    relevance as the tie-breaker.
//!
//! Lookups for all hits run concurrently. A failing vector query is fatal
//! and propagates; so does a failing store lookup.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::index::{VectorFilter, VectorIndex, VectorMatch};
use crate::models::{
    Document, KnowledgeEntry, RetrievalResponse, RetrievalResult, DEFAULT_AUTHORITY_WEIGHT,
};
use crate::store::KnowledgeStore;

pub const DEFAULT_TOP_K: usize = 5;

/// The three collaborators every knowledge operation needs.
#[derive(Clone)]
pub struct Knowledge {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub store: Arc<dyn KnowledgeStore>,
}

impl Knowledge {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }
}

/// Retrieve the `top_k` most relevant documents for `query` within
/// `company_id`.
pub async fn retrieve(
    kb: &Knowledge,
    query: &str,
    company_id: &str,
    top_k: usize,
) -> Result<RetrievalResponse> {
    let vector = kb
        .embedder
        .embed(query)
        .await
        .context("failed to embed query")?;

    let hits = kb
        .index
        .query(&vector, top_k, &VectorFilter::company(company_id))
        .await
        .context("vector query failed")?;

    debug!(company_id, hits = hits.len(), "vector query returned");

    let lookups = hits.iter().map(|hit| async move {
        let entry_id = hit.id.as_str();
        let document_id = hit.metadata.document_id.as_str();
        let (document, entry) = futures::try_join!(
            kb.store.get_document(document_id),
            kb.store.get_knowledge_entry(entry_id),
        )?;
        anyhow::Ok((document, entry))
    });
    let enriched = try_join_all(lookups).await?;

    let candidates = hits.into_iter().zip(enriched).collect();
    let results = rank_results(company_id, candidates);

    Ok(RetrievalResponse {
        query: query.to_string(),
        total_results: results.len(),
        results,
    })
}

/// Turn enriched hits into ranked results.
///
/// Pure so the ranking law can be tested without collaborators.
pub fn rank_results(
    company_id: &str,
    candidates: Vec<(VectorMatch, (Option<Document>, Option<KnowledgeEntry>))>,
) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> = candidates
        .into_iter()
        .filter_map(|(hit, (document, entry))| {
            let document = match document {
                Some(doc) if !doc.is_excluded => doc,
                Some(_) => {
                    debug!(document_id = %hit.metadata.document_id, "dropping excluded document");
                    return None;
                }
                None => {
                    debug!(
                        document_id = %hit.metadata.document_id,
                        "dropping hit with no document"
                    );
                    return None;
                }
            };
            if document.company_id != company_id {
                warn!(
                    document_id = %document.id,
                    company_id,
                    "vector hit belongs to another company; dropping"
                );
                return None;
            }

            let (data_type, authority_weight) = match entry {
                Some(e) => (e.data_type, e.authority_weight),
                None => (hit.metadata.data_type, DEFAULT_AUTHORITY_WEIGHT),
            };

            Some(RetrievalResult {
                document_id: document.id,
                title: document.title,
                content: document.content,
                relevance_score: hit.score,
                data_type,
                source_url: document.source_url,
                authority_weight,
            })
        })
        .collect();

    // Stable: equal keys keep the index's order
    results.sort_by(|a, b| {
        b.effective_score()
            .partial_cmp(&a.effective_score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(Ordering::Equal)
            })
    });
    results
}
