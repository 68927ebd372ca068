//! SQLite-backed relational store.
//!
//! [`SqliteStore`] implements the three store traits from `synapse-core`
//! over the schema created by [`crate::migrate`]. Text searches select the
//! user's rows in SQL and match them in Rust with
//! [`matches_query`](synapse_core::store::matches_query), since SQLite's
//! `lower()` only folds ASCII. An empty query matches every row.
//!
//! Digest and brief payloads are written through
//! [`Artifact`](synapse_core::artifact::Artifact) so each row names its own
//! kind and is shape-checked when read back.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use synapse_core::artifact::Artifact;
use synapse_core::brief::MeetingBrief;
use synapse_core::digest::{DailyDigest, DigestStatus};
use synapse_core::models::{
    CalendarEvent, ChatMessage, Company, Contact, Conversation, Document, Email, Interaction,
    KnowledgeEntry, Memory, MemoryKind, User,
};
use synapse_core::store::{matches_query, ActivityStore, ContextStore, KnowledgeStore, TimeWindow};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_company(&self, company: &Company) -> Result<()> {
        sqlx::query(
            "INSERT INTO companies (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&company.id)
        .bind(&company.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, company_id, name, email) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                name = excluded.name,
                email = excluded.email",
        )
        .bind(&user.id)
        .bind(&user.company_id)
        .bind(&user.name)
        .bind(&user.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents
                (id, company_id, title, content, content_type, source_url, is_excluded, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                title = excluded.title,
                content = excluded.content,
                content_type = excluded.content_type,
                source_url = excluded.source_url,
                is_excluded = excluded.is_excluded,
                updated_at = excluded.updated_at",
        )
        .bind(&doc.id)
        .bind(&doc.company_id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.content_type)
        .bind(&doc.source_url)
        .bind(doc.is_excluded)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip the exclusion flag. Returns `false` if the document is unknown.
    pub async fn set_document_excluded(&self, id: &str, excluded: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE documents SET is_excluded = ? WHERE id = ?")
            .bind(excluded)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_email(&self, email: &Email) -> Result<()> {
        sqlx::query(
            "INSERT INTO emails
                (id, user_id, thread_id, from_address, from_name, to_addresses, subject, body,
                 priority, draft_ready, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                from_address = excluded.from_address,
                from_name = excluded.from_name,
                to_addresses = excluded.to_addresses,
                subject = excluded.subject,
                body = excluded.body,
                priority = excluded.priority,
                draft_ready = excluded.draft_ready,
                received_at = excluded.received_at",
        )
        .bind(&email.id)
        .bind(&email.user_id)
        .bind(&email.thread_id)
        .bind(&email.from_address)
        .bind(&email.from_name)
        .bind(serde_json::to_string(&email.to_addresses)?)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.priority.map(|p| p.to_string()))
        .bind(email.draft_ready)
        .bind(email.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_event(&self, event: &CalendarEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO calendar_events
                (id, user_id, title, description, location, start_at, end_at, attendees)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                attendees = excluded.attendees",
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(serde_json::to_string(&event.attendees)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_memory(&self, memory: &Memory) -> Result<()> {
        sqlx::query(
            "INSERT INTO memories
                (id, user_id, kind, title, content, is_active, last_accessed_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                content = excluded.content,
                is_active = excluded.is_active,
                last_accessed_at = excluded.last_accessed_at",
        )
        .bind(&memory.id)
        .bind(&memory.user_id)
        .bind(memory.kind.to_string())
        .bind(&memory.title)
        .bind(&memory.content)
        .bind(memory.is_active)
        .bind(memory.last_accessed_at)
        .bind(memory.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, messages_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                messages_json = excluded.messages_json,
                updated_at = excluded.updated_at",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(serde_json::to_string(&conversation.messages)?)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn json_list<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<Vec<T>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("malformed JSON in column {}", column))
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        content_type: row.try_get("content_type")?,
        source_url: row.try_get("source_url")?,
        is_excluded: row.try_get("is_excluded")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<KnowledgeEntry> {
    let data_type: String = row.try_get("data_type")?;
    Ok(KnowledgeEntry {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        document_id: row.try_get("document_id")?,
        data_type: data_type.parse()?,
        authority_weight: row.try_get("authority_weight")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn email_from_row(row: &SqliteRow) -> Result<Email> {
    let priority: Option<String> = row.try_get("priority")?;
    Ok(Email {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        thread_id: row.try_get("thread_id")?,
        from_address: row.try_get("from_address")?,
        from_name: row.try_get("from_name")?,
        to_addresses: json_list(row, "to_addresses")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        priority: priority.map(|p| p.parse()).transpose()?,
        draft_ready: row.try_get("draft_ready")?,
        received_at: row.try_get("received_at")?,
    })
}

fn contact_from_row(row: &SqliteRow) -> Result<Contact> {
    let tier: String = row.try_get("tier")?;
    Ok(Contact {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        company: row.try_get("company")?,
        title: row.try_get("title")?,
        tier: tier.parse()?,
        last_contacted_at: row.try_get("last_contacted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn interaction_from_row(row: &SqliteRow) -> Result<Interaction> {
    let kind: String = row.try_get("kind")?;
    Ok(Interaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        contact_id: row.try_get("contact_id")?,
        kind: kind.parse()?,
        summary: row.try_get("summary")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        attendees: json_list(row, "attendees")?,
    })
}

fn memory_from_row(row: &SqliteRow) -> Result<Memory> {
    let kind: String = row.try_get("kind")?;
    Ok(Memory {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: kind.parse()?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        is_active: row.try_get("is_active")?,
        last_accessed_at: row.try_get("last_accessed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    let messages: Vec<ChatMessage> = json_list(row, "messages_json")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        messages,
        updated_at: row.try_get("updated_at")?,
    })
}

fn digest_from_row(row: &SqliteRow) -> Result<DailyDigest> {
    let date: String = row.try_get("digest_date")?;
    let status: String = row.try_get("status")?;
    let content: String = row.try_get("content_json")?;
    Ok(DailyDigest {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .with_context(|| format!("invalid digest date: {}", date))?,
        status: status.parse()?,
        content: Artifact::from_json(&content)?.into_digest()?,
        created_at: row.try_get("created_at")?,
    })
}

fn brief_from_row(row: &SqliteRow) -> Result<MeetingBrief> {
    let content: String = row.try_get("content_json")?;
    Ok(MeetingBrief {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_id: row.try_get("event_id")?,
        content: Artifact::from_json(&content)?.into_brief()?,
        generated_at: row.try_get("generated_at")?,
    })
}

fn collect<T>(rows: Vec<SqliteRow>, map: fn(&SqliteRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, company_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE company_id = ? ORDER BY id")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, document_from_row)
    }

    async fn get_knowledge_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let row = sqlx::query("SELECT * FROM knowledge_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn upsert_knowledge_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO knowledge_entries
                (id, company_id, document_id, data_type, authority_weight, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                data_type = excluded.data_type,
                authority_weight = excluded.authority_weight,
                updated_at = excluded.updated_at",
        )
        .bind(&entry.id)
        .bind(&entry.company_id)
        .bind(&entry.document_id)
        .bind(entry.data_type.to_string())
        .bind(entry.authority_weight)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_knowledge_entry(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ContextStore for SqliteStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT u.id, u.company_id, u.name, u.email
             FROM users u JOIN companies c ON c.id = u.company_id
             WHERE u.id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(User {
                id: row.try_get("id")?,
                company_id: row.try_get("company_id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            })
        })
        .transpose()
    }

    async fn search_conversations(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let conversations = collect(rows, conversation_from_row)?;
        Ok(conversations
            .into_iter()
            .filter(|c| {
                let messages = serde_json::to_string(&c.messages).unwrap_or_default();
                matches_query(query, &[c.title.as_str(), messages.as_str()])
            })
            .take(limit)
            .collect())
    }

    async fn search_emails(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Email>> {
        let rows = sqlx::query("SELECT * FROM emails WHERE user_id = ? ORDER BY received_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let emails = collect(rows, email_from_row)?;
        Ok(emails
            .into_iter()
            .filter(|e| matches_query(query, &[e.subject.as_str(), e.body.as_str()]))
            .take(limit)
            .collect())
    }

    async fn search_contacts(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Contact>> {
        let rows = sqlx::query("SELECT * FROM contacts WHERE user_id = ? ORDER BY rowid")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let contacts = collect(rows, contact_from_row)?;
        Ok(contacts
            .into_iter()
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
            .collect())
    }

    async fn search_calendar(
        &self,
        user_id: &str,
        query: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM calendar_events
             WHERE user_id = ?1 AND start_at >= ?2 AND start_at < ?3
             ORDER BY start_at ASC",
        )
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        let events = collect(rows, event_from_row)?;
        Ok(events
            .into_iter()
            .filter(|e| {
                matches_query(query, &[e.title.as_str(), e.description.as_deref().unwrap_or("")])
            })
            .take(limit)
            .collect())
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT * FROM memories
             WHERE user_id = ? AND is_active = 1
             ORDER BY last_accessed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let memories = collect(rows, memory_from_row)?;
        Ok(memories
            .into_iter()
            .filter(|m| matches_query(query, &[m.title.as_str(), m.content.as_str()]))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn list_user_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn emails_between(&self, user_id: &str, window: &TimeWindow) -> Result<Vec<Email>> {
        let rows = sqlx::query(
            "SELECT * FROM emails
             WHERE user_id = ? AND received_at >= ? AND received_at < ?
             ORDER BY received_at DESC",
        )
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, email_from_row)
    }

    async fn events_between(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<CalendarEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM calendar_events
             WHERE user_id = ? AND start_at >= ? AND start_at < ?
             ORDER BY start_at ASC",
        )
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, event_from_row)
    }

    async fn next_event_after(&self, user_id: &str, ts: i64) -> Result<Option<CalendarEvent>> {
        let row = sqlx::query(
            "SELECT * FROM calendar_events
             WHERE user_id = ? AND start_at > ?
             ORDER BY start_at ASC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<CalendarEvent>> {
        let row = sqlx::query("SELECT * FROM calendar_events WHERE id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_contacts(&self, user_id: &str) -> Result<Vec<Contact>> {
        let rows = sqlx::query("SELECT * FROM contacts WHERE user_id = ? ORDER BY rowid")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, contact_from_row)
    }

    async fn find_contact_by_email(&self, user_id: &str, email: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT * FROM contacts WHERE user_id = ? AND lower(email) = lower(?) LIMIT 1",
        )
        .bind(user_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(contact_from_row).transpose()
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            "INSERT INTO contacts
                (id, user_id, name, email, company, title, tier, last_contacted_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                company = excluded.company,
                title = excluded.title,
                tier = excluded.tier,
                last_contacted_at = excluded.last_contacted_at",
        )
        .bind(&contact.id)
        .bind(&contact.user_id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.company)
        .bind(&contact.title)
        .bind(contact.tier.to_string())
        .bind(contact.last_contacted_at)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_interactions(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let rows = sqlx::query(
            "SELECT * FROM interactions WHERE contact_id = ? ORDER BY occurred_at DESC LIMIT ?",
        )
        .bind(contact_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, interaction_from_row)
    }

    async fn recent_emails_with(
        &self,
        user_id: &str,
        address: &str,
        limit: usize,
    ) -> Result<Vec<Email>> {
        // Recipients are a JSON array, so match the quoted address inside it
        let address = address.trim().to_lowercase();
        let quoted = format!("\"{}\"", address);
        let rows = sqlx::query(
            "SELECT * FROM emails
             WHERE user_id = ?1
               AND (lower(from_address) = ?2 OR instr(lower(to_addresses), ?3) > 0)
             ORDER BY received_at DESC
             LIMIT ?4",
        )
        .bind(user_id)
        .bind(&address)
        .bind(&quoted)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, email_from_row)
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE contacts
             SET last_contacted_at = MAX(COALESCE(last_contacted_at, ?1), ?1)
             WHERE id = ?2",
        )
        .bind(interaction.occurred_at)
        .bind(&interaction.contact_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            bail!("contact not found: {}", interaction.contact_id);
        }

        sqlx::query(
            "INSERT INTO interactions (id, user_id, contact_id, kind, summary, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&interaction.id)
        .bind(&interaction.user_id)
        .bind(&interaction.contact_id)
        .bind(interaction.kind.to_string())
        .bind(&interaction.summary)
        .bind(interaction.occurred_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn active_memories(&self, user_id: &str, kind: MemoryKind) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT * FROM memories
             WHERE user_id = ? AND kind = ? AND is_active = 1
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(kind.to_string())
        .fetch_all(&self.pool)
        .await?;
        collect(rows, memory_from_row)
    }

    async fn get_digest(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyDigest>> {
        let row = sqlx::query("SELECT * FROM daily_digests WHERE user_id = ? AND digest_date = ?")
            .bind(user_id)
            .bind(date.format(DATE_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(digest_from_row).transpose()
    }

    async fn insert_digest(&self, digest: &DailyDigest) -> Result<bool> {
        let content = Artifact::DailyDigest(digest.content.clone()).to_json()?;
        let result = sqlx::query(
            "INSERT INTO daily_digests (id, user_id, digest_date, status, content_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, digest_date) DO NOTHING",
        )
        .bind(&digest.id)
        .bind(&digest.user_id)
        .bind(digest.date.format(DATE_FORMAT).to_string())
        .bind(digest.status.to_string())
        .bind(content)
        .bind(digest.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_digest_status(
        &self,
        user_id: &str,
        date: NaiveDate,
        status: DigestStatus,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE daily_digests SET status = ? WHERE user_id = ? AND digest_date = ?")
                .bind(status.to_string())
                .bind(user_id)
                .bind(date.format(DATE_FORMAT).to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_brief(&self, event_id: &str) -> Result<Option<MeetingBrief>> {
        let row = sqlx::query("SELECT * FROM meeting_briefs WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(brief_from_row).transpose()
    }

    async fn upsert_brief(&self, brief: &MeetingBrief) -> Result<()> {
        let content = Artifact::MeetingBrief(brief.content.clone()).to_json()?;
        sqlx::query(
            "INSERT INTO meeting_briefs (id, user_id, event_id, content_json, generated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(event_id) DO UPDATE SET
                content_json = excluded.content_json,
                generated_at = excluded.generated_at",
        )
        .bind(&brief.id)
        .bind(&brief.user_id)
        .bind(&brief.event_id)
        .bind(content)
        .bind(brief.generated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("failed to store brief for event {}: {}", brief.event_id, e))?;
        Ok(())
    }
}
