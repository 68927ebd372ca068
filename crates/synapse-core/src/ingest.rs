//! Knowledge ingestion: document → knowledge entry + vector record.
//!
//! Ingestion is idempotent per document. The knowledge entry id (and with
//! it the vector id) is derived from the document id, so re-ingesting an
//! edited document overwrites the previous entry and vector in place.
//!
//! ```text
//! Document ──classify──▶ DataType ──weight──▶ KnowledgeEntry (store)
//!     │                                             │ id
//!     └──embed(title + content)──▶ VectorRecord ────┘ (index)
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::classify_document;
use crate::error::EngineError;
use crate::index::{content_preview, VectorFilter, VectorMetadata, VectorRecord};
use crate::models::{Document, KnowledgeEntry};
use crate::retrieval::Knowledge;

/// What happened to a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Indexed { entry: KnowledgeEntry },
    /// Not an error: the document is missing or excluded.
    Skipped { reason: String },
}

/// Counters returned by [`ingest_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub total: usize,
}

/// Classify, persist, and index one document.
///
/// An excluded document is never indexed; any entry or vectors left over
/// from before it was excluded are purged.
pub async fn ingest(kb: &Knowledge, document_id: &str) -> Result<IngestOutcome> {
    let document = match kb.store.get_document(document_id).await? {
        Some(doc) => doc,
        None => {
            return Ok(IngestOutcome::Skipped {
                reason: format!("document {} not found", document_id),
            })
        }
    };

    if document.is_excluded {
        let removed = purge(kb, &document.company_id, &document.id).await?;
        info!(document_id, removed, "document excluded; skipped ingestion");
        return Ok(IngestOutcome::Skipped {
            reason: "document is excluded".to_string(),
        });
    }

    let entry = index_document(kb, &document).await?;
    info!(
        document_id,
        company_id = %document.company_id,
        data_type = %entry.data_type,
        "document ingested"
    );
    Ok(IngestOutcome::Indexed { entry })
}

async fn index_document(kb: &Knowledge, document: &Document) -> Result<KnowledgeEntry> {
    let data_type = classify_document(&document.title, &document.content);
    let now = Utc::now().timestamp();
    let id = KnowledgeEntry::id_for_document(&document.id);

    let created_at = kb
        .store
        .get_knowledge_entry(&id)
        .await?
        .map(|existing| existing.created_at)
        .unwrap_or(now);

    let entry = KnowledgeEntry {
        id,
        company_id: document.company_id.clone(),
        document_id: document.id.clone(),
        data_type,
        authority_weight: data_type.authority_weight(),
        created_at,
        updated_at: now,
    };

    let text = format!("{}\n\n{}", document.title, document.content);
    let values = kb
        .embedder
        .embed(&text)
        .await
        .with_context(|| format!("failed to embed document {}", document.id))?;

    kb.store.upsert_knowledge_entry(&entry).await?;
    kb.index
        .upsert(&[VectorRecord {
            id: entry.id.clone(),
            values,
            metadata: VectorMetadata {
                document_id: document.id.clone(),
                company_id: document.company_id.clone(),
                title: document.title.clone(),
                content_preview: content_preview(&document.content),
                data_type,
                source_url: document.source_url.clone(),
            },
        }])
        .await
        .with_context(|| format!("failed to index document {}", document.id))?;

    Ok(entry)
}

/// Ingest every document of a company, continuing past failures.
pub async fn ingest_all(kb: &Knowledge, company_id: &str) -> Result<IngestSummary> {
    let documents = kb.store.list_documents(company_id).await?;
    let mut summary = IngestSummary {
        total: documents.len(),
        ..Default::default()
    };

    for document in &documents {
        match ingest(kb, &document.id).await {
            Ok(_) => summary.success_count += 1,
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "ingestion failed");
                summary.error_count += 1;
            }
        }
    }

    info!(
        company_id,
        total = summary.total,
        ok = summary.success_count,
        failed = summary.error_count,
        "bulk ingestion finished"
    );
    Ok(summary)
}

/// Delete the knowledge entry and every vector for a document.
///
/// Safe to call repeatedly. Returns the number of vectors removed.
pub async fn remove_document(kb: &Knowledge, document_id: &str, company_id: &str) -> Result<usize> {
    if let Some(document) = kb.store.get_document(document_id).await? {
        if document.company_id != company_id {
            return Err(EngineError::DocumentNotFound(document_id.to_string()).into());
        }
    }
    let removed = purge(kb, company_id, document_id).await?;
    info!(document_id, company_id, removed, "document removed from knowledge base");
    Ok(removed)
}

async fn purge(kb: &Knowledge, company_id: &str, document_id: &str) -> Result<usize> {
    kb.store
        .delete_knowledge_entry(&KnowledgeEntry::id_for_document(document_id))
        .await?;
    kb.index
        .delete_by_filter(&VectorFilter::document(company_id, document_id))
        .await
}
