//! In-memory relational store for tests and embedded use.
//!
//! Implements all three store traits over plain collections behind one
//! `RwLock`, so a test can seed records with the `insert_*` helpers and
//! hand the same `Arc<InMemoryStore>` to every component.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{matches_query, ActivityStore, ContextStore, KnowledgeStore, TimeWindow};
use crate::brief::MeetingBrief;
use crate::digest::{DailyDigest, DigestStatus};
use crate::models::{
    CalendarEvent, Company, Contact, Conversation, Document, Email, Interaction, KnowledgeEntry,
    Memory, MemoryKind, User,
};

#[derive(Default)]
struct State {
    companies: HashMap<String, Company>,
    users: HashMap<String, User>,
    documents: HashMap<String, Document>,
    entries: HashMap<String, KnowledgeEntry>,
    emails: Vec<Email>,
    contacts: Vec<Contact>,
    interactions: Vec<Interaction>,
    events: Vec<CalendarEvent>,
    memories: Vec<Memory>,
    conversations: Vec<Conversation>,
    digests: HashMap<(String, NaiveDate), DailyDigest>,
    briefs: HashMap<String, MeetingBrief>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("store lock poisoned"))
    }

    pub fn insert_company(&self, company: Company) -> Result<()> {
        self.write()?.companies.insert(company.id.clone(), company);
        Ok(())
    }

    pub fn insert_user(&self, user: User) -> Result<()> {
        self.write()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Insert or replace a document by id.
    pub fn insert_document(&self, document: Document) -> Result<()> {
        self.write()?.documents.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.documents.remove(id).is_some())
    }

    pub fn set_document_excluded(&self, id: &str, excluded: bool) -> Result<()> {
        let mut state = self.write()?;
        match state.documents.get_mut(id) {
            Some(doc) => {
                doc.is_excluded = excluded;
                Ok(())
            }
            None => bail!("document not found: {}", id),
        }
    }

    pub fn insert_email(&self, email: Email) -> Result<()> {
        self.write()?.emails.push(email);
        Ok(())
    }

    pub fn insert_contact(&self, contact: Contact) -> Result<()> {
        let mut state = self.write()?;
        upsert_by_id(&mut state.contacts, contact, |c| &c.id);
        Ok(())
    }

    pub fn insert_event(&self, event: CalendarEvent) -> Result<()> {
        self.write()?.events.push(event);
        Ok(())
    }

    pub fn insert_memory(&self, memory: Memory) -> Result<()> {
        self.write()?.memories.push(memory);
        Ok(())
    }

    pub fn insert_conversation(&self, conversation: Conversation) -> Result<()> {
        self.write()?.conversations.push(conversation);
        Ok(())
    }

    pub fn company(&self, id: &str) -> Option<Company> {
        self.read().ok()?.companies.get(id).cloned()
    }

    pub fn knowledge_entry_count(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn contact(&self, id: &str) -> Option<Contact> {
        let state = self.read().ok()?;
        state.contacts.iter().find(|c| c.id == id).cloned()
    }

    pub fn interaction_count(&self) -> usize {
        self.read().map(|s| s.interactions.len()).unwrap_or(0)
    }
}

fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> &String) {
    match items.iter().position(|existing| id(existing) == id(&item)) {
        Some(pos) => items[pos] = item,
        None => items.push(item),
    }
}

/// Newest-first by `key`, capped at `limit`.
fn newest_first<T: Clone>(items: Vec<&T>, key: impl Fn(&T) -> i64, limit: usize) -> Vec<T> {
    let mut items = items;
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items.into_iter().take(limit).cloned().collect()
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn list_documents(&self, company_id: &str) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.company_id == company_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn get_knowledge_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        Ok(self.read()?.entries.get(id).cloned())
    }

    async fn upsert_knowledge_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        self.write()?.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_knowledge_entry(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.entries.remove(id).is_some())
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.read()?.users.get(user_id).cloned())
    }

    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let state = self.read()?;
        let hits = state
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| {
                let messages = serde_json::to_string(&c.messages).unwrap_or_default();
                matches_query(query, &[c.title.as_str(), messages.as_str()])
            })
            .collect();
        Ok(newest_first(hits, |c| c.updated_at, limit))
    }

    async fn search_emails(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Email>> {
        let state = self.read()?;
        let hits = state
            .emails
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| matches_query(query, &[e.subject.as_str(), e.body.as_str()]))
            .collect();
        Ok(newest_first(hits, |e| e.received_at, limit))
    }

    async fn search_contacts(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Contact>> {
        let state = self.read()?;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| {
                matches_query(
                    query,
                    &[
                        c.name.as_str(),
                        c.email.as_str(),
                        c.company.as_deref().unwrap_or(""),
                        c.title.as_deref().unwrap_or(""),
                    ],
                )
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_calendar(
        &self,
        user_id: &str,
        query: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let state = self.read()?;
        let mut hits: Vec<CalendarEvent> = state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && window.contains(e.start_at))
            .filter(|e| {
                matches_query(query, &[e.title.as_str(), e.description.as_deref().unwrap_or("")])
            })
            .cloned()
            .collect();
        hits.sort_by_key(|e| e.start_at);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let state = self.read()?;
        let hits = state
            .memories
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter(|m| matches_query(query, &[m.title.as_str(), m.content.as_str()]))
            .collect();
        Ok(newest_first(hits, |m| m.last_accessed_at, limit))
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn list_user_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.users.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn emails_between(&self, user_id: &str, window: &TimeWindow) -> Result<Vec<Email>> {
        let state = self.read()?;
        Ok(state
            .emails
            .iter()
            .filter(|e| e.user_id == user_id && window.contains(e.received_at))
            .cloned()
            .collect())
    }

    async fn events_between(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<CalendarEvent>> {
        let state = self.read()?;
        let mut events: Vec<CalendarEvent> = state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && window.contains(e.start_at))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_at);
        Ok(events)
    }

    async fn next_event_after(&self, user_id: &str, ts: i64) -> Result<Option<CalendarEvent>> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.start_at > ts)
            .min_by_key(|e| e.start_at)
            .cloned())
    }

    async fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<CalendarEvent>> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .find(|e| e.id == event_id && e.user_id == user_id)
            .cloned())
    }

    async fn list_contacts(&self, user_id: &str) -> Result<Vec<Contact>> {
        let state = self.read()?;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_contact_by_email(&self, user_id: &str, email: &str) -> Result<Option<Contact>> {
        let state = self.read()?;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.user_id == user_id && c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        let mut state = self.write()?;
        upsert_by_id(&mut state.contacts, contact.clone(), |c| &c.id);
        Ok(())
    }

    async fn recent_interactions(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let state = self.read()?;
        let hits = state
            .interactions
            .iter()
            .filter(|i| i.contact_id == contact_id)
            .collect();
        Ok(newest_first(hits, |i| i.occurred_at, limit))
    }

    async fn recent_emails_with(
        &self,
        user_id: &str,
        address: &str,
        limit: usize,
    ) -> Result<Vec<Email>> {
        let state = self.read()?;
        let hits = state
            .emails
            .iter()
            .filter(|e| e.user_id == user_id && e.involves(address))
            .collect();
        Ok(newest_first(hits, |e| e.received_at, limit))
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        // Both writes happen under one lock acquisition
        let mut state = self.write()?;
        let contact = state
            .contacts
            .iter_mut()
            .find(|c| c.id == interaction.contact_id)
            .ok_or_else(|| anyhow!("contact not found: {}", interaction.contact_id))?;
        contact.last_contacted_at = Some(
            contact
                .last_contacted_at
                .map_or(interaction.occurred_at, |prev| prev.max(interaction.occurred_at)),
        );
        state.interactions.push(interaction.clone());
        Ok(())
    }

    async fn active_memories(&self, user_id: &str, kind: MemoryKind) -> Result<Vec<Memory>> {
        let state = self.read()?;
        Ok(state
            .memories
            .iter()
            .filter(|m| m.user_id == user_id && m.kind == kind && m.is_active)
            .cloned()
            .collect())
    }

    async fn get_digest(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyDigest>> {
        Ok(self
            .read()?
            .digests
            .get(&(user_id.to_string(), date))
            .cloned())
    }

    async fn insert_digest(&self, digest: &DailyDigest) -> Result<bool> {
        let mut state = self.write()?;
        let key = (digest.user_id.clone(), digest.date);
        if state.digests.contains_key(&key) {
            return Ok(false);
        }
        state.digests.insert(key, digest.clone());
        Ok(true)
    }

    async fn set_digest_status(
        &self,
        user_id: &str,
        date: NaiveDate,
        status: DigestStatus,
    ) -> Result<bool> {
        let mut state = self.write()?;
        match state.digests.get_mut(&(user_id.to_string(), date)) {
            Some(digest) => {
                digest.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_brief(&self, event_id: &str) -> Result<Option<MeetingBrief>> {
        Ok(self.read()?.briefs.get(event_id).cloned())
    }

    async fn upsert_brief(&self, brief: &MeetingBrief) -> Result<()> {
        self.write()?
            .briefs
            .insert(brief.event_id.clone(), brief.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, ContactTier, InteractionKind};

    fn email(id: &str, subject: &str, received_at: i64) -> Email {
        Email {
            id: id.into(),
            user_id: "u1".into(),
            thread_id: None,
            from_address: "ana@acme.com".into(),
            from_name: Some("Ana".into()),
            to_addresses: vec!["me@corp.com".into()],
            subject: subject.into(),
            body: String::new(),
            priority: None,
            draft_ready: false,
            received_at,
        }
    }

    fn contact(id: &str) -> Contact {
        Contact {
            id: id.into(),
            user_id: "u1".into(),
            name: "Ana".into(),
            email: "ana@acme.com".into(),
            company: Some("Acme".into()),
            title: None,
            tier: ContactTier::Inner,
            last_contacted_at: Some(100),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_email_search_recency_and_limit() {
        let store = InMemoryStore::new();
        store.insert_email(email("old", "Pricing v1", 10)).unwrap();
        store.insert_email(email("new", "Pricing v2", 30)).unwrap();
        store.insert_email(email("mid", "Lunch", 20)).unwrap();

        let hits = store.search_emails("u1", "pricing", 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let capped = store.search_emails("u1", "", 1).await.unwrap();
        assert_eq!(capped[0].id, "new");
        assert!(store.search_emails("u2", "", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_search_covers_messages() {
        let store = InMemoryStore::new();
        store
            .insert_conversation(Conversation {
                id: "c1".into(),
                user_id: "u1".into(),
                title: "Chat".into(),
                messages: vec![ChatMessage::user("what about the Globex renewal?")],
                updated_at: 1,
            })
            .unwrap();
        let hits = store.search_conversations("u1", "globex", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_calendar_window_and_order() {
        let store = InMemoryStore::new();
        for (id, start) in [("late", 300), ("early", 100), ("outside", 1_000)] {
            store
                .insert_event(CalendarEvent {
                    id: id.into(),
                    user_id: "u1".into(),
                    title: "Review".into(),
                    description: None,
                    location: None,
                    start_at: start,
                    end_at: start + 60,
                    attendees: vec![],
                })
                .unwrap();
        }
        let hits = store
            .search_calendar("u1", "review", &TimeWindow::new(0, 500), 5)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(store.next_event_after("u1", 300).await.unwrap().unwrap().id, "outside");
    }

    #[tokio::test]
    async fn test_record_interaction_advances_contact() {
        let store = InMemoryStore::new();
        store.insert_contact(contact("c1")).unwrap();
        store
            .record_interaction(&Interaction {
                id: "i1".into(),
                user_id: "u1".into(),
                contact_id: "c1".into(),
                kind: InteractionKind::Meeting,
                summary: "Kickoff".into(),
                occurred_at: 500,
            })
            .await
            .unwrap();
        assert_eq!(store.contact("c1").unwrap().last_contacted_at, Some(500));
        assert_eq!(store.interaction_count(), 1);
    }

    #[tokio::test]
    async fn test_record_interaction_unknown_contact_writes_nothing() {
        let store = InMemoryStore::new();
        let err = store
            .record_interaction(&Interaction {
                id: "i1".into(),
                user_id: "u1".into(),
                contact_id: "missing".into(),
                kind: InteractionKind::Call,
                summary: String::new(),
                occurred_at: 1,
            })
            .await;
        assert!(err.is_err());
        assert_eq!(store.interaction_count(), 0);
    }

    #[tokio::test]
    async fn test_find_contact_case_insensitive() {
        let store = InMemoryStore::new();
        store.insert_contact(contact("c1")).unwrap();
        let found = store.find_contact_by_email("u1", "ANA@acme.com").await.unwrap();
        assert_eq!(found.unwrap().id, "c1");
    }
}
