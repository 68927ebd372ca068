//! Relational storage abstraction.
//!
//! The engine reads and writes relational records through three traits,
//! grouped by the component that needs them:
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`KnowledgeStore`] | ingestion and retrieval (documents, knowledge entries) |
//! | [`ContextStore`] | context assembly (tenant resolution, per-source searches) |
//! | [`ActivityStore`] | digest and brief synthesis (windows, contacts, persisted artifacts) |
//!
//! Implementations must be `Send + Sync` and rely on per-row atomic upserts;
//! the only multi-statement transaction is
//! [`ActivityStore::record_interaction`].
//!
//! Text searches are case-insensitive substring matches of the whole query.
//! An empty query matches every row, so a search degrades to "most recent
//! N" rather than "nothing".

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::brief::MeetingBrief;
use crate::digest::{DailyDigest, DigestStatus};
use crate::models::{
    CalendarEvent, Contact, Conversation, Document, Email, Interaction, KnowledgeEntry, Memory,
    MemoryKind, User,
};

/// Half-open time range `[start, end)` in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// `[now - past_days, now + future_days)`.
    ///
    /// Negative day counts are treated as zero and the bounds saturate at
    /// the ends of the `i64` range.
    pub fn around(now: i64, past_days: i64, future_days: i64) -> Self {
        let span = |days: i64| days.max(0).saturating_mul(86_400);
        Self {
            start: now.saturating_sub(span(past_days)),
            end: now.saturating_add(span(future_days)),
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Documents and their knowledge entries.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Every document owned by `company_id`, excluded ones included.
    async fn list_documents(&self, company_id: &str) -> Result<Vec<Document>>;

    async fn get_knowledge_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>>;

    /// Insert or replace by entry id.
    async fn upsert_knowledge_entry(&self, entry: &KnowledgeEntry) -> Result<()>;

    /// Returns `true` if an entry was removed.
    async fn delete_knowledge_entry(&self, id: &str) -> Result<bool>;
}

/// Per-source searches used by the context assembler.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Resolve a user (and through it, the tenant). `None` if unknown.
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Match over title or serialized message content, most recent first.
    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>>;

    /// Match over subject or body, most recent first.
    async fn search_emails(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Email>>;

    /// Match over name, email, company, or title.
    async fn search_contacts(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Contact>>;

    /// Match over title or description within `window`, earliest first.
    async fn search_calendar(
        &self,
        user_id: &str,
        query: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>>;

    /// Match over title or content, most recently accessed first.
    async fn search_memories(&self, user_id: &str, query: &str, limit: usize)
        -> Result<Vec<Memory>>;
}

/// Reads and writes needed by the digest and brief synthesizers.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn list_user_ids(&self) -> Result<Vec<String>>;

    async fn emails_between(&self, user_id: &str, window: &TimeWindow) -> Result<Vec<Email>>;

    /// Events starting within `window`, earliest first.
    async fn events_between(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<CalendarEvent>>;

    /// The first event starting strictly after `ts`.
    async fn next_event_after(&self, user_id: &str, ts: i64) -> Result<Option<CalendarEvent>>;

    async fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<CalendarEvent>>;

    async fn list_contacts(&self, user_id: &str) -> Result<Vec<Contact>>;

    /// Case-insensitive lookup by email address.
    async fn find_contact_by_email(&self, user_id: &str, email: &str) -> Result<Option<Contact>>;

    async fn upsert_contact(&self, contact: &Contact) -> Result<()>;

    /// Most recent interactions with a contact, newest first.
    async fn recent_interactions(&self, contact_id: &str, limit: usize)
        -> Result<Vec<Interaction>>;

    /// Most recent emails sent to or from `address`, newest first.
    async fn recent_emails_with(
        &self,
        user_id: &str,
        address: &str,
        limit: usize,
    ) -> Result<Vec<Email>>;

    /// Store an interaction and advance the contact's `last_contacted_at`
    /// in one transaction.
    async fn record_interaction(&self, interaction: &Interaction) -> Result<()>;

    async fn active_memories(&self, user_id: &str, kind: MemoryKind) -> Result<Vec<Memory>>;

    async fn get_digest(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyDigest>>;

    /// Insert a digest unless one already exists for `(user_id, date)`.
    /// Returns `false` when an existing digest was kept.
    async fn insert_digest(&self, digest: &DailyDigest) -> Result<bool>;

    /// Returns `false` if no digest exists for `(user_id, date)`.
    async fn set_digest_status(
        &self,
        user_id: &str,
        date: NaiveDate,
        status: DigestStatus,
    ) -> Result<bool>;

    async fn get_brief(&self, event_id: &str) -> Result<Option<MeetingBrief>>;

    /// Insert or replace the brief for `brief.event_id`.
    async fn upsert_brief(&self, brief: &MeetingBrief) -> Result<()>;
}

/// Case-insensitive substring test shared by in-process store
/// implementations.
pub fn matches_query(query: &str, fields: &[&str]) -> bool {
    let needle = query.trim().to_lowercase();
    needle.is_empty()
        || fields
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_around() {
        let w = TimeWindow::around(1_000_000, 30, 7);
        assert_eq!(w.start, 1_000_000 - 30 * 86_400);
        assert_eq!(w.end, 1_000_000 + 7 * 86_400);
        assert!(w.contains(1_000_000));
        assert!(!w.contains(w.end));
        assert!(w.contains(w.start));
    }

    #[test]
    fn test_window_around_saturates() {
        let w = TimeWindow::around(1_000_000, 200_000_000_000_000, i64::MAX);
        assert_eq!(w.start, 1_000_000 - i64::MAX);
        assert_eq!(w.end, i64::MAX);
        assert!(w.contains(0));
    }

    #[test]
    fn test_window_around_ignores_negative_days() {
        let w = TimeWindow::around(1_000_000, -5, -1);
        assert_eq!(w, TimeWindow::new(1_000_000, 1_000_000));
        assert!(!w.contains(1_000_000));
    }

    #[test]
    fn test_matches_query() {
        assert!(matches_query("Board", &["Q3 board deck", "x"]));
        assert!(matches_query("", &["anything"]));
        assert!(matches_query("  ", &[]));
        assert!(!matches_query("pricing", &["Q3 board deck"]));
    }
}
