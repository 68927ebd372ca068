//! The [`Engine`] facade: one handle over every knowledge operation.
//!
//! The CLI, the HTTP server, and the job worker all go through the engine,
//! which owns the collaborators (embedder, vector index, stores, text
//! generator) and the tunables loaded from config. Every operation takes
//! the caller's `user_id` and resolves the tenant from it; a user that
//! cannot be resolved fails with
//! [`EngineError::TenantNotFound`](synapse_core::EngineError).
//!
//! # Answer flow
//!
//! ```text
//! question ──▶ conflict check ──conflict──▶ Answer::Clarification (no generation)
//!                    │ none
//!                    ▼
//!              retrieval (failure ⇒ "no knowledge" notice)
//!                    │
//!              context assembly
//!                    │
//!              generation ──▶ Answer::Generated { text, sources }
//! ```

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use synapse_core::brief::{generate_meeting_brief, BriefSettings, BriefSources, MeetingBrief};
use synapse_core::conflict::{detect_conflicts, ConflictPolicy};
use synapse_core::context::{build_context, ContextBundle, ContextOptions};
use synapse_core::digest::{
    dismiss_digest, generate_daily_digest, run_daily_digests, DigestOutcome, DigestRunSummary,
    DigestSettings,
};
use synapse_core::embedding::Embedder;
use synapse_core::generation::TextGenerator;
use synapse_core::index::VectorIndex;
use synapse_core::ingest::{ingest, ingest_all, remove_document, IngestOutcome, IngestSummary};
use synapse_core::models::{
    ChatMessage, ConflictReport, DataType, Interaction, InteractionKind, RetrievalResponse,
    RetrievalResult, User,
};
use synapse_core::prompt;
use synapse_core::retrieval::{retrieve, Knowledge};
use synapse_core::store::{ActivityStore, ContextStore, KnowledgeStore};
use synapse_core::EngineError;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::guard::{TimeoutEmbedder, TimeoutIndex};
use crate::sqlite_index::SqliteVectorIndex;
use crate::sqlite_store::SqliteStore;

/// Tunables the engine applies to every call.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    pub conflict: ConflictPolicy,
    pub context: ContextOptions,
    pub digest: DigestSettings,
    pub brief: BriefSettings,
    pub max_tokens: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: synapse_core::retrieval::DEFAULT_TOP_K,
            conflict: ConflictPolicy::default(),
            context: ContextOptions::default(),
            digest: DigestSettings::default(),
            brief: BriefSettings::default(),
            max_tokens: 1024,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            conflict: config.conflict.policy(),
            context: config.context.options(),
            digest: config.digest_settings(),
            brief: config.brief_settings(),
            max_tokens: config.generation.max_tokens,
        }
    }
}

/// A source the answer may cite as `[index]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub index: usize,
    pub document_id: String,
    pub title: String,
    pub data_type: DataType,
    pub authority_weight: f64,
    pub source_url: Option<String>,
}

impl Citation {
    fn list(results: &[RetrievalResult]) -> Vec<Citation> {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| Citation {
                index: i + 1,
                document_id: r.document_id.clone(),
                title: r.title.clone(),
                data_type: r.data_type,
                authority_weight: r.authority_weight,
                source_url: r.source_url.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// Financial sources disagree; the user must pick one first.
    Clarification {
        prompt: String,
        conflict: ConflictReport,
    },
    Generated {
        text: String,
        sources: Vec<Citation>,
        /// `false` when retrieval failed and the answer had no knowledge block.
        knowledge_available: bool,
        output_tokens: u32,
    },
}

#[derive(Clone)]
pub struct Engine {
    kb: Knowledge,
    context: Arc<dyn ContextStore>,
    activity: Arc<dyn ActivityStore>,
    generator: Arc<dyn TextGenerator>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        kb: Knowledge,
        context: Arc<dyn ContextStore>,
        activity: Arc<dyn ActivityStore>,
        generator: Arc<dyn TextGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            kb,
            context,
            activity,
            generator,
            settings,
        }
    }

    /// Wire the SQLite store and index, the configured providers, and the
    /// timeout guards.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store = Arc::new(SqliteStore::new(pool.clone()));

        let embedder: Arc<dyn Embedder> = Arc::from(create_provider(&config.embedding)?);
        let embedder = Arc::new(TimeoutEmbedder::new(
            embedder,
            Duration::from_secs(config.embedding.timeout_secs),
        ));
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(pool));
        let index = Arc::new(TimeoutIndex::new(
            index,
            Duration::from_secs(config.vector.timeout_secs),
        ));
        let generator: Arc<dyn TextGenerator> = Arc::from(create_generator(&config.generation)?);

        let knowledge_store: Arc<dyn KnowledgeStore> = store.clone();
        Ok(Self::new(
            Knowledge::new(embedder, index, knowledge_store),
            store.clone(),
            store,
            generator,
            EngineSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn resolve_user(&self, user_id: &str) -> Result<User> {
        self.context
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::TenantNotFound(user_id.to_string()).into())
    }

    // ============ Knowledge ============

    pub async fn ingest(&self, document_id: &str) -> Result<IngestOutcome> {
        ingest(&self.kb, document_id).await
    }

    pub async fn ingest_all(&self, company_id: &str) -> Result<IngestSummary> {
        ingest_all(&self.kb, company_id).await
    }

    pub async fn remove_document(&self, document_id: &str, company_id: &str) -> Result<usize> {
        remove_document(&self.kb, document_id, company_id).await
    }

    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalResponse> {
        let user = self.resolve_user(user_id).await?;
        let top_k = top_k.unwrap_or(self.settings.top_k);
        retrieve(&self.kb, query, &user.company_id, top_k)
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "knowledge retrieval failed");
                e
            })
    }

    pub async fn detect_conflicts(&self, user_id: &str, query: &str) -> Result<ConflictReport> {
        let user = self.resolve_user(user_id).await?;
        detect_conflicts(&self.kb, query, &user.company_id, &self.settings.conflict).await
    }

    pub async fn build_context(
        &self,
        user_id: &str,
        query: &str,
        options: Option<&ContextOptions>,
    ) -> Result<ContextBundle> {
        let options = options.unwrap_or(&self.settings.context);
        build_context(&self.kb, self.context.as_ref(), query, user_id, options).await
    }

    /// Answer a question from company knowledge and personal context.
    pub async fn ask(&self, user_id: &str, question: &str) -> Result<Answer> {
        let user = self.resolve_user(user_id).await?;
        let company_id = user.company_id.as_str();

        let report = detect_conflicts(&self.kb, question, company_id, &self.settings.conflict)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id, error = %e, "conflict check failed; continuing without it");
                ConflictReport::none()
            });
        if report.has_conflict {
            info!(user_id, "returning clarification instead of an answer");
            return Ok(Answer::Clarification {
                prompt: prompt::clarification_prompt(&report),
                conflict: report,
            });
        }

        let knowledge = match retrieve(&self.kb, question, company_id, self.settings.top_k).await {
            Ok(response) => Some(response.results),
            Err(e) => {
                error!(user_id, error = %e, "couldn't retrieve knowledge; answering without it");
                None
            }
        };
        // Documents reach the prompt through the knowledge block
        let options = ContextOptions {
            include_documents: false,
            ..self.settings.context.clone()
        };
        let bundle =
            build_context(&self.kb, self.context.as_ref(), question, user_id, &options).await?;

        let knowledge_text = match &knowledge {
            Some(results) => prompt::knowledge_block(results),
            None => prompt::NO_KNOWLEDGE_NOTICE.to_string(),
        };
        let message = prompt::question_with_context(
            question,
            &knowledge_text,
            &prompt::context_block(&bundle),
        );

        let completion = self
            .generator
            .complete(
                &[ChatMessage::user(message)],
                prompt::ANSWER_SYSTEM_PROMPT,
                self.settings.max_tokens,
            )
            .await?;

        Ok(Answer::Generated {
            text: completion.text,
            sources: knowledge.as_deref().map(Citation::list).unwrap_or_default(),
            knowledge_available: knowledge.is_some(),
            output_tokens: completion.output_tokens,
        })
    }

    // ============ Synthesis ============

    pub async fn generate_digest(
        &self,
        user_id: &str,
        date: NaiveDate,
        now: i64,
    ) -> Result<DigestOutcome> {
        self.resolve_user(user_id).await?;
        generate_daily_digest(self.activity.as_ref(), user_id, date, now, &self.settings.digest)
            .await
    }

    pub async fn dismiss_digest(&self, user_id: &str, date: NaiveDate) -> Result<()> {
        dismiss_digest(self.activity.as_ref(), user_id, date).await
    }

    pub async fn run_daily_digests(&self, date: NaiveDate, now: i64) -> Result<DigestRunSummary> {
        run_daily_digests(self.activity.as_ref(), date, now, &self.settings.digest).await
    }

    pub async fn generate_brief(
        &self,
        user_id: &str,
        event_id: &str,
        now: i64,
    ) -> Result<MeetingBrief> {
        let sources = BriefSources {
            kb: &self.kb,
            context: self.context.as_ref(),
            activity: self.activity.as_ref(),
            generator: self.generator.as_ref(),
        };
        generate_meeting_brief(&sources, user_id, event_id, now, &self.settings.brief).await
    }

    /// Record an interaction with a known contact and bump its
    /// `last_contacted_at`.
    pub async fn log_interaction(
        &self,
        user_id: &str,
        contact_email: &str,
        kind: InteractionKind,
        summary: &str,
        occurred_at: i64,
    ) -> Result<Interaction> {
        self.resolve_user(user_id).await?;
        let Some(contact) = self
            .activity
            .find_contact_by_email(user_id, contact_email)
            .await?
        else {
            bail!("contact not found: {}", contact_email);
        };

        let interaction = Interaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            contact_id: contact.id,
            kind,
            summary: summary.to_string(),
            occurred_at,
        };
        self.activity.record_interaction(&interaction).await?;
        info!(user_id, contact = contact_email, kind = %kind, "interaction recorded");
        Ok(interaction)
    }
}
