//! Multi-source context assembly.
//!
//! [`build_context`] resolves the user's tenant, then runs six searches
//! concurrently and merges them into one [`ContextBundle`]:
//!
//! | Source | Match | Order |
//! |--------|-------|-------|
//! | conversations | title or message content | most recently updated |
//! | documents | semantic retrieval, re-hydrated | retrieval rank |
//! | emails | subject or body | most recently received |
//! | contacts | name, email, company, or title | store order |
//! | calendar | title or description, within the window | earliest first |
//! | memories | title or content | most recently accessed |
//!
//! Tenant resolution is the only fatal step. Each source is its own
//! failure domain: an error is logged and that source contributes an empty
//! list while the others are returned as usual.

use anyhow::{Context as _, Result};
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{CalendarEvent, Contact, Conversation, Document, Email, Memory};
use crate::retrieval::{retrieve, Knowledge};
use crate::store::{ContextStore, TimeWindow};

pub const DEFAULT_LIMIT: usize = 5;
/// Per-source ceiling applied to caller-supplied limits.
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_CALENDAR_PAST_DAYS: i64 = 30;
pub const DEFAULT_CALENDAR_FUTURE_DAYS: i64 = 7;

/// Which sources to search and how much to take from each.
///
/// Conversations are always searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    pub include_documents: bool,
    pub include_emails: bool,
    pub include_contacts: bool,
    pub include_calendar: bool,
    pub include_memories: bool,
    pub limit: usize,
    pub calendar_past_days: i64,
    pub calendar_future_days: i64,
    /// Reference time for the calendar window; wall clock when unset.
    pub now: Option<i64>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            include_documents: true,
            include_emails: true,
            include_contacts: true,
            include_calendar: true,
            include_memories: true,
            limit: DEFAULT_LIMIT,
            calendar_past_days: DEFAULT_CALENDAR_PAST_DAYS,
            calendar_future_days: DEFAULT_CALENDAR_FUTURE_DAYS,
            now: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub user_id: String,
    pub company_id: String,
    pub conversations: Vec<Conversation>,
    pub documents: Vec<Document>,
    pub emails: Vec<Email>,
    pub contacts: Vec<Contact>,
    pub calendar_events: Vec<CalendarEvent>,
    pub memories: Vec<Memory>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
            && self.documents.is_empty()
            && self.emails.is_empty()
            && self.contacts.is_empty()
            && self.calendar_events.is_empty()
            && self.memories.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.conversations.len()
            + self.documents.len()
            + self.emails.len()
            + self.contacts.len()
            + self.calendar_events.len()
            + self.memories.len()
    }
}

/// Assemble cross-entity context for `query` on behalf of `user_id`.
pub async fn build_context(
    kb: &Knowledge,
    store: &dyn ContextStore,
    query: &str,
    user_id: &str,
    options: &ContextOptions,
) -> Result<ContextBundle> {
    let user = store
        .get_user(user_id)
        .await
        .context("tenant resolution failed")?
        .ok_or_else(|| EngineError::TenantNotFound(user_id.to_string()))?;
    let company_id = user.company_id.as_str();

    let limit = options.limit.min(MAX_LIMIT);
    let now = options.now.unwrap_or_else(|| Utc::now().timestamp());
    let window = TimeWindow::around(now, options.calendar_past_days, options.calendar_future_days);

    let (conversations, documents, emails, contacts, calendar_events, memories) = futures::join!(
        store.search_conversations(user_id, query, limit),
        when(options.include_documents, search_documents(kb, query, company_id, limit)),
        when(options.include_emails, store.search_emails(user_id, query, limit)),
        when(options.include_contacts, store.search_contacts(user_id, query, limit)),
        when(options.include_calendar, store.search_calendar(user_id, query, &window, limit)),
        when(options.include_memories, store.search_memories(user_id, query, limit)),
    );

    let bundle = ContextBundle {
        user_id: user_id.to_string(),
        company_id: company_id.to_string(),
        conversations: or_empty("conversations", user_id, conversations, limit),
        documents: or_empty("documents", user_id, documents, limit),
        emails: or_empty("emails", user_id, emails, limit),
        contacts: or_empty("contacts", user_id, contacts, limit),
        calendar_events: or_empty("calendar", user_id, calendar_events, limit),
        memories: or_empty("memories", user_id, memories, limit),
    };
    debug!(user_id, items = bundle.item_count(), "context assembled");
    Ok(bundle)
}

/// Run `search` only when the source is enabled.
async fn when<T>(
    enabled: bool,
    search: impl std::future::Future<Output = Result<Vec<T>>>,
) -> Result<Vec<T>> {
    if enabled {
        search.await
    } else {
        Ok(Vec::new())
    }
}

fn or_empty<T>(source: &str, user_id: &str, result: Result<Vec<T>>, limit: usize) -> Vec<T> {
    match result {
        Ok(mut items) => {
            items.truncate(limit);
            items
        }
        Err(e) => {
            warn!(source, user_id, error = %e, "context sub-search failed");
            Vec::new()
        }
    }
}

/// Semantic retrieval, then the full rows in rank order.
async fn search_documents(
    kb: &Knowledge,
    query: &str,
    company_id: &str,
    limit: usize,
) -> Result<Vec<Document>> {
    let response = retrieve(kb, query, company_id, limit).await?;
    let rows = try_join_all(
        response
            .results
            .iter()
            .map(|r| kb.store.get_document(&r.document_id)),
    )
    .await?;
    Ok(rows
        .into_iter()
        .flatten()
        .filter(|doc| !doc.is_excluded && doc.company_id == company_id)
        .collect())
}
