//! Numeric conflict detection.
//!
//! Before answering a numerically sensitive question ("what was Q3
//! revenue?"), the engine checks whether its financial sources agree. The
//! detector runs a wider retrieval pass, keeps only `FINANCIAL` results,
//! extracts every quantity from their content, and measures the relative
//! spread `(max - min) / min`. A spread above the threshold means the
//! sources disagree, and the user is asked to disambiguate instead of
//! receiving an answer built on contradictory figures.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::index::truncate_chars;
use crate::models::{ConflictReport, ConflictingResult, DataType, RetrievalResult};
use crate::quantity::{extract_quantities, relative_spread};
use crate::retrieval::{retrieve, Knowledge};

pub const DEFAULT_TRIGGERS: &[&str] = &["revenue", "profit"];
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.05;
pub const DEFAULT_CONFLICT_TOP_K: usize = 10;
/// Content length of each result attached to a conflict report.
pub const CONFLICT_CONTENT_CHARS: usize = 500;

/// When and how strictly to check for disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    /// Lowercase terms that make a query numerically sensitive.
    pub triggers: Vec<String>,
    pub variance_threshold: f64,
    pub top_k: usize,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_TRIGGERS.iter().map(|t| t.to_string()).collect(),
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            top_k: DEFAULT_CONFLICT_TOP_K,
        }
    }
}

impl ConflictPolicy {
    pub fn is_numeric_sensitive(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.triggers
            .iter()
            .any(|t| !t.is_empty() && query.contains(&t.to_lowercase()))
    }
}

/// Check whether the company's financial sources disagree about `query`.
///
/// Queries without a trigger term return an empty report without touching
/// the index. Retrieval failures propagate.
pub async fn detect_conflicts(
    kb: &Knowledge,
    query: &str,
    company_id: &str,
    policy: &ConflictPolicy,
) -> Result<ConflictReport> {
    if !policy.is_numeric_sensitive(query) {
        return Ok(ConflictReport::none());
    }

    let response = retrieve(kb, query, company_id, policy.top_k).await?;
    let report = evaluate(&response.results, policy);
    if report.has_conflict {
        info!(
            company_id,
            sources = report.conflicting_results.as_ref().map_or(0, Vec::len),
            variance = report.variance.unwrap_or_default(),
            "conflicting financial figures"
        );
    }
    Ok(report)
}

/// Decide whether already-retrieved results conflict.
///
/// Only `FINANCIAL` results are considered, and at least two of them must
/// be present. Every figure in every such result participates; the report
/// lists the results that contributed at least one figure.
pub fn evaluate(results: &[RetrievalResult], policy: &ConflictPolicy) -> ConflictReport {
    let financial: Vec<&RetrievalResult> = results
        .iter()
        .filter(|r| r.data_type == DataType::Financial)
        .collect();
    if financial.len() < 2 {
        return ConflictReport::none();
    }

    let mut values = Vec::new();
    let mut contributors = Vec::new();
    for result in financial {
        let found = extract_quantities(&result.content);
        debug!(document_id = %result.document_id, figures = ?found, "extracted figures");
        if !found.is_empty() {
            values.extend(found);
            contributors.push(result);
        }
    }

    let Some(spread) = relative_spread(&values) else {
        return ConflictReport::none();
    };

    if spread > policy.variance_threshold {
        ConflictReport {
            has_conflict: true,
            conflicting_results: Some(
                contributors
                    .into_iter()
                    .map(|r| ConflictingResult {
                        document_id: r.document_id.clone(),
                        title: r.title.clone(),
                        content: truncate_chars(&r.content, CONFLICT_CONTENT_CHARS),
                        data_type: r.data_type,
                    })
                    .collect(),
            ),
            variance: Some(spread),
        }
    } else {
        ConflictReport {
            has_conflict: false,
            conflicting_results: None,
            variance: Some(spread),
        }
    }
}
