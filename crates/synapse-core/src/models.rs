//! Core data models shared by ingestion, retrieval, context assembly, and
//! the digest/brief synthesizers.
//!
//! Persisted records (documents, knowledge entries, emails, contacts, …)
//! carry Unix-second timestamps, matching how the SQLite store keeps them.
//! Request-scoped types ([`RetrievalResult`], [`ConflictReport`]) are never
//! written anywhere.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============ Documents & knowledge ============

/// A company-owned document as stored in the relational store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub company_id: String,
    pub title: String,
    pub content: String,
    pub content_type: String,
    pub source_url: Option<String>,
    /// Excluded documents are never indexed and never retrieved.
    pub is_excluded: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

string_enum! {
    /// Knowledge category assigned at ingestion time.
    ///
    /// Each category carries a fixed authority weight that multiplies
    /// semantic relevance during ranking.
    DataType {
        Financial => "FINANCIAL",
        Strategic => "STRATEGIC",
        Product => "PRODUCT",
        Operational => "OPERATIONAL",
        Communication => "COMMUNICATION",
    }
}

/// Weight used when a hit has no knowledge entry to read one from.
pub const DEFAULT_AUTHORITY_WEIGHT: f64 = 1.0;

impl DataType {
    /// Authority multiplier for this category.
    ///
    /// | Category | Weight |
    /// |----------|--------|
    /// | `FINANCIAL` | 1.5 |
    /// | `STRATEGIC` | 1.3 |
    /// | `PRODUCT` | 1.0 |
    /// | `OPERATIONAL` | 1.0 |
    /// | `COMMUNICATION` | 0.8 |
    pub fn authority_weight(&self) -> f64 {
        match self {
            DataType::Financial => 1.5,
            DataType::Strategic => 1.3,
            DataType::Product => 1.0,
            DataType::Operational => 1.0,
            DataType::Communication => 0.8,
        }
    }
}

/// The retrievable representation of a non-excluded document.
///
/// The embedding itself lives only in the vector index, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub company_id: String,
    pub document_id: String,
    pub data_type: DataType,
    pub authority_weight: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl KnowledgeEntry {
    /// Deterministic entry id for a document.
    ///
    /// Re-ingesting a document always targets the same entry and vector id,
    /// so repeated ingestion overwrites instead of duplicating.
    pub fn id_for_document(document_id: &str) -> String {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("synapse:knowledge-entry:{}", document_id).as_bytes(),
        )
        .to_string()
    }
}

/// One ranked piece of evidence returned by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub document_id: String,
    pub title: String,
    pub content: String,
    /// Cosine similarity reported by the vector index, in `[-1.0, 1.0]`.
    pub relevance_score: f64,
    pub data_type: DataType,
    pub source_url: Option<String>,
    pub authority_weight: f64,
}

impl RetrievalResult {
    /// `relevance × authority`, the primary ranking key.
    pub fn effective_score(&self) -> f64 {
        self.relevance_score * self.authority_weight
    }
}

/// Response shape of [`retrieve`](crate::retrieval::retrieve).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub results: Vec<RetrievalResult>,
    pub total_results: usize,
}

/// A source involved in a numeric disagreement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictingResult {
    pub document_id: String,
    pub title: String,
    /// Content truncated to 500 characters.
    pub content: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConflictReport {
    pub has_conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_results: Option<Vec<ConflictingResult>>,
    /// Relative spread `(max - min) / min` of the extracted figures, when
    /// enough figures were found to compute it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
}

impl ConflictReport {
    pub fn none() -> Self {
        Self::default()
    }
}

// ============ Tenancy ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub email: String,
}

// ============ Personal records ============

string_enum! {
    EmailPriority {
        Urgent => "urgent",
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Email {
    pub id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_addresses: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Stored priority; `None` means the email was never triaged and is
    /// classified on read.
    pub priority: Option<EmailPriority>,
    /// A reply draft has been prepared and is waiting for review.
    pub draft_ready: bool,
    pub received_at: i64,
}

impl Email {
    /// True if `address` sent or received this email (case-insensitive).
    pub fn involves(&self, address: &str) -> bool {
        self.from_address.eq_ignore_ascii_case(address)
            || self
                .to_addresses
                .iter()
                .any(|to| to.eq_ignore_ascii_case(address))
    }
}

string_enum! {
    /// How closely a contact should be kept in touch with.
    ContactTier {
        Inner => "inner",
        Active => "active",
        Casual => "casual",
    }
}

impl Default for ContactTier {
    fn default() -> Self {
        ContactTier::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub tier: ContactTier,
    pub last_contacted_at: Option<i64>,
    pub created_at: i64,
}

string_enum! {
    InteractionKind {
        Email => "email",
        Meeting => "meeting",
        Call => "call",
        Note => "note",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: String,
    pub user_id: String,
    pub contact_id: String,
    pub kind: InteractionKind,
    pub summary: String,
    pub occurred_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: i64,
    pub end_at: i64,
    /// Attendee email addresses.
    pub attendees: Vec<String>,
}

string_enum! {
    MemoryKind {
        Fact => "fact",
        Preference => "preference",
        Goal => "goal",
        Relationship => "relationship",
    }
}

/// A fact, preference, or goal extracted from past conversations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub kind: MemoryKind,
    pub title: String,
    pub content: String,
    pub is_active: bool,
    pub last_accessed_at: i64,
    pub created_at: i64,
}

string_enum! {
    Role {
        System => "system",
        User => "user",
        Assistant => "assistant",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: i64,
}
