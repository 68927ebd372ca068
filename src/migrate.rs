//! Idempotent schema creation (`synapse init`).
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so migrations can run on
//! every startup. Timestamps are Unix seconds; list-valued columns
//! (attendees, recipients, chat messages) are JSON text; vectors are
//! little-endian `f32` BLOBs.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[(&str, &str)] = &[
    (
        "companies",
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            FOREIGN KEY (company_id) REFERENCES companies(id)
        )
        "#,
    ),
    (
        "documents",
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text/plain',
            source_url TEXT,
            is_excluded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "knowledge_entries",
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_entries (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            document_id TEXT NOT NULL UNIQUE,
            data_type TEXT NOT NULL,
            authority_weight REAL NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "vector_records",
        r#"
        CREATE TABLE IF NOT EXISTS vector_records (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content_preview TEXT NOT NULL,
            data_type TEXT NOT NULL,
            source_url TEXT,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    ),
    (
        "idx_vector_records_company",
        "CREATE INDEX IF NOT EXISTS idx_vector_records_company ON vector_records(company_id, document_id)",
    ),
    (
        "emails",
        r#"
        CREATE TABLE IF NOT EXISTS emails (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            thread_id TEXT,
            from_address TEXT NOT NULL,
            from_name TEXT,
            to_addresses TEXT NOT NULL DEFAULT '[]',
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            priority TEXT,
            draft_ready INTEGER NOT NULL DEFAULT 0,
            received_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "idx_emails_user_received",
        "CREATE INDEX IF NOT EXISTS idx_emails_user_received ON emails(user_id, received_at)",
    ),
    (
        "contacts",
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            company TEXT,
            title TEXT,
            tier TEXT NOT NULL DEFAULT 'active',
            last_contacted_at INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "interactions",
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            summary TEXT NOT NULL,
            occurred_at INTEGER NOT NULL,
            FOREIGN KEY (contact_id) REFERENCES contacts(id)
        )
        "#,
    ),
    (
        "calendar_events",
        r#"
        CREATE TABLE IF NOT EXISTS calendar_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            location TEXT,
            start_at INTEGER NOT NULL,
            end_at INTEGER NOT NULL,
            attendees TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    ),
    (
        "memories",
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_accessed_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "conversations",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            messages_json TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "daily_digests",
        r#"
        CREATE TABLE IF NOT EXISTS daily_digests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            digest_date TEXT NOT NULL,
            status TEXT NOT NULL,
            content_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(user_id, digest_date)
        )
        "#,
    ),
    (
        "meeting_briefs",
        r#"
        CREATE TABLE IF NOT EXISTS meeting_briefs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            event_id TEXT NOT NULL UNIQUE,
            content_json TEXT NOT NULL,
            generated_at INTEGER NOT NULL
        )
        "#,
    ),
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for (name, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create {}", name))?;
    }
    Ok(())
}
