//! JSON dataset import (`synapse import`).
//!
//! A dataset is one JSON object whose keys are record collections. Every
//! key is optional and records are upserted by id, so importing the same
//! file twice is a no-op. Interactions go through
//! [`ActivityStore::record_interaction`], which also advances the contact's
//! `last_contacted_at`.
//!
//! ```json
//! {
//!   "companies": [{ "id": "acme", "name": "Acme" }],
//!   "users": [{ "id": "u1", "company_id": "acme", "name": "Ana", "email": "ana@acme.com" }],
//!   "documents": [{ "id": "q3", "company_id": "acme", "title": "Q3 report", "content": "..." }]
//! }
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use synapse_core::models::{
    CalendarEvent, Company, Contact, Conversation, Document, Email, EmailPriority, Interaction,
    Memory, User,
};
use synapse_core::store::ActivityStore;

use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub companies: Vec<Company>,
    pub users: Vec<User>,
    pub documents: Vec<DocumentRecord>,
    pub emails: Vec<EmailRecord>,
    pub contacts: Vec<Contact>,
    pub interactions: Vec<Interaction>,
    pub events: Vec<CalendarEvent>,
    pub memories: Vec<Memory>,
    pub conversations: Vec<Conversation>,
}

/// A document with optional bookkeeping fields.
#[derive(Debug, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub company_id: String,
    pub title: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl DocumentRecord {
    fn into_document(self, now: i64) -> Document {
        let created_at = self.created_at.unwrap_or(now);
        Document {
            id: self.id,
            company_id: self.company_id,
            title: self.title,
            content: self.content,
            content_type: self.content_type,
            source_url: self.source_url,
            is_excluded: self.is_excluded,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub to_addresses: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub priority: Option<EmailPriority>,
    #[serde(default)]
    pub draft_ready: bool,
    pub received_at: i64,
}

impl From<EmailRecord> for Email {
    fn from(r: EmailRecord) -> Self {
        Email {
            id: r.id,
            user_id: r.user_id,
            thread_id: r.thread_id,
            from_address: r.from_address,
            from_name: r.from_name,
            to_addresses: r.to_addresses,
            subject: r.subject,
            body: r.body,
            priority: r.priority,
            draft_ready: r.draft_ready,
            received_at: r.received_at,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub companies: usize,
    pub users: usize,
    pub documents: usize,
    pub emails: usize,
    pub contacts: usize,
    pub interactions: usize,
    pub events: usize,
    pub memories: usize,
    pub conversations: usize,
    /// Ids of imported documents, for follow-up ingestion.
    pub document_ids: Vec<String>,
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset: {}", path.display()))
}

/// Upsert every record. Parents are written before children.
pub async fn import(store: &SqliteStore, dataset: Dataset) -> Result<ImportSummary> {
    let now = Utc::now().timestamp();
    let mut summary = ImportSummary::default();

    for company in &dataset.companies {
        store.upsert_company(company).await?;
        summary.companies += 1;
    }
    for user in &dataset.users {
        store.upsert_user(user).await?;
        summary.users += 1;
    }
    for record in dataset.documents {
        let document = record.into_document(now);
        store.upsert_document(&document).await?;
        summary.document_ids.push(document.id);
        summary.documents += 1;
    }
    for record in dataset.emails {
        store.upsert_email(&record.into()).await?;
        summary.emails += 1;
    }
    for contact in &dataset.contacts {
        store.upsert_contact(contact).await?;
        summary.contacts += 1;
    }
    for interaction in &dataset.interactions {
        store
            .record_interaction(interaction)
            .await
            .with_context(|| format!("failed to import interaction {}", interaction.id))?;
        summary.interactions += 1;
    }
    for event in &dataset.events {
        store.upsert_event(event).await?;
        summary.events += 1;
    }
    for memory in &dataset.memories {
        store.upsert_memory(memory).await?;
        summary.memories += 1;
    }
    for conversation in &dataset.conversations {
        store.upsert_conversation(conversation).await?;
        summary.conversations += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_defaults() {
        let ds: Dataset = serde_json::from_str(
            r#"{ "documents": [{ "id": "d", "company_id": "c", "title": "T", "content": "x" }] }"#,
        )
        .unwrap();
        let doc = ds.documents.into_iter().next().unwrap().into_document(100);
        assert_eq!(doc.content_type, "text/plain");
        assert!(!doc.is_excluded);
        assert_eq!(doc.created_at, 100);
        assert_eq!(doc.updated_at, 100);
    }

    #[test]
    fn test_missing_collections_are_empty() {
        let ds: Dataset = serde_json::from_str("{}").unwrap();
        assert!(ds.companies.is_empty());
        assert!(ds.events.is_empty());
    }

    #[test]
    fn test_email_priority_parses_lowercase() {
        let ds: Dataset = serde_json::from_str(
            r#"{ "emails": [{ "id": "e", "user_id": "u", "from_address": "a@b.c",
                 "subject": "s", "priority": "urgent", "received_at": 1 }] }"#,
        )
        .unwrap();
        let email: Email = ds.emails.into_iter().next().unwrap().into();
        assert_eq!(email.priority, Some(EmailPriority::Urgent));
        assert!(email.to_addresses.is_empty());
    }
}
