//! End-to-end engine tests against the in-memory store and index.
//!
//! These drive the same [`Engine`] the CLI and server use, with the
//! deterministic hashing embedder and a scripted text generator, so no
//! database or network is involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use synapse::embedding::HashingProvider;
use synapse::engine::{Answer, Engine, EngineSettings};
use synapse_core::digest::DigestOutcome;
use synapse_core::embedding::Embedder;
use synapse_core::generation::{Completion, TextGenerator};
use synapse_core::index::memory::InMemoryVectorIndex;
use synapse_core::models::{
    CalendarEvent, ChatMessage, Company, Contact, ContactTier, DataType, Document, InteractionKind,
    User,
};
use synapse_core::prompt::NO_KNOWLEDGE_NOTICE;
use synapse_core::retrieval::Knowledge;
use synapse_core::store::memory::InMemoryStore;
use synapse_core::store::ActivityStore;
use synapse_core::EngineError;

const NOW: i64 = 1_717_243_200; // 2024-06-01T12:00:00Z

/// Returns a fixed reply and records every user message it was given.
struct Scripted {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn complete(&self, messages: &[ChatMessage], _s: &str, _t: u32) -> Result<Completion> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        Ok(Completion {
            text: self.reply.clone(),
            output_tokens: 7,
        })
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("embedding service unavailable")
    }
}

/// Hashing embedder that counts calls.
struct Counting {
    inner: HashingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for Counting {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}

struct Harness {
    engine: Engine,
    store: Arc<InMemoryStore>,
    generator: Arc<Scripted>,
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (company, user) in [("acme", "u-acme"), ("globex", "u-globex")] {
        store
            .insert_company(Company {
                id: company.into(),
                name: company.into(),
            })
            .unwrap();
        store
            .insert_user(User {
                id: user.into(),
                company_id: company.into(),
                name: user.into(),
                email: format!("{}@{}.com", user, company),
            })
            .unwrap();
    }
    store
}

fn harness_with(embedder: Arc<dyn Embedder>, reply: &str) -> Harness {
    let store = seeded_store();
    let generator = Scripted::new(reply);
    let kb = Knowledge::new(embedder, Arc::new(InMemoryVectorIndex::new()), store.clone());
    let engine = Engine::new(
        kb,
        store.clone(),
        store.clone(),
        generator.clone(),
        EngineSettings::default(),
    );
    Harness {
        engine,
        store,
        generator,
    }
}

fn harness(reply: &str) -> Harness {
    harness_with(Arc::new(HashingProvider::new(256).unwrap()), reply)
}

fn document(id: &str, company: &str, title: &str, content: &str) -> Document {
    Document {
        id: id.into(),
        company_id: company.into(),
        title: title.into(),
        content: content.into(),
        content_type: "text/plain".into(),
        source_url: None,
        is_excluded: false,
        created_at: NOW,
        updated_at: NOW,
    }
}

async fn add(h: &Harness, doc: Document) {
    let id = doc.id.clone();
    h.store.insert_document(doc).unwrap();
    h.engine.ingest(&id).await.unwrap();
}

#[tokio::test]
async fn test_close_figures_answer_with_both_sources() {
    let h = harness("Q3 revenue was about $1.2M [1][2].");
    add(&h, document("fin-1", "acme", "Q3 revenue report", "Q3 revenue was $1.2M.")).await;
    let summary = "Quarterly revenue came in at $1.25M.";
    add(&h, document("fin-2", "acme", "Board revenue summary", summary)).await;

    let report = h.engine.detect_conflicts("u-acme", "What was Q3 revenue?").await.unwrap();
    assert!(!report.has_conflict);
    assert!(report.variance.unwrap() < 0.05);

    let answer = h.engine.ask("u-acme", "What was Q3 revenue?").await.unwrap();
    let Answer::Generated {
        text,
        sources,
        knowledge_available,
        output_tokens,
    } = answer
    else {
        panic!("expected a generated answer");
    };
    assert_eq!(text, "Q3 revenue was about $1.2M [1][2].");
    assert!(knowledge_available);
    assert_eq!(output_tokens, 7);
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|s| s.data_type == DataType::Financial));
    assert_eq!(sources[0].index, 1);

    let prompt = h.generator.last_prompt();
    assert!(prompt.contains("Q3 revenue report"));
    assert!(prompt.contains("Board revenue summary"));
}

#[tokio::test]
async fn test_ask_retrieves_documents_once() {
    let embedder = Arc::new(Counting {
        inner: HashingProvider::new(256).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let h = harness_with(embedder.clone(), "Q3 revenue was about $1.2M [1][2].");
    add(&h, document("fin-1", "acme", "Q3 revenue report", "Q3 revenue was $1.2M.")).await;
    add(&h, document("fin-2", "acme", "Board revenue summary", "Revenue came in at $1.25M.")).await;
    embedder.calls.store(0, Ordering::SeqCst);

    let answer = h.engine.ask("u-acme", "What was Q3 revenue?").await.unwrap();
    assert!(matches!(answer, Answer::Generated { .. }));

    // One embedding for the conflict check, one for the knowledge block
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    let prompt = h.generator.last_prompt();
    assert_eq!(prompt.matches("Board revenue summary").count(), 1);
    assert!(!prompt.contains("Related documents"));
}

#[tokio::test]
async fn test_disagreeing_figures_ask_for_clarification() {
    let h = harness("unused");
    add(&h, document("fin-1", "acme", "Q3 revenue report", "Q3 revenue was $1.2M.")).await;
    let forecast = "Revenue is projected at $2.5M.";
    add(&h, document("fin-2", "acme", "Revenue forecast", forecast)).await;

    let answer = h.engine.ask("u-acme", "What is our revenue?").await.unwrap();
    match answer {
        Answer::Clarification { prompt, conflict } => {
            assert!(conflict.has_conflict);
            assert_eq!(conflict.conflicting_results.as_ref().unwrap().len(), 2);
            assert!(conflict.variance.unwrap() > 1.0);
            assert!(prompt.contains("Q3 revenue report"));
            assert!(prompt.contains("Revenue forecast"));
        }
        other => panic!("expected clarification, got {:?}", other),
    }
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_questions_without_trigger_skip_conflict_check() {
    let h = harness("ok");
    add(&h, document("fin-1", "acme", "Budget", "Budget: $1.2M.")).await;
    add(&h, document("fin-2", "acme", "Budget v2", "Budget: $9M.")).await;

    let report = h.engine.detect_conflicts("u-acme", "How is the budget?").await.unwrap();
    assert!(!report.has_conflict);
    assert_eq!(report.variance, None);
}

#[tokio::test]
async fn test_retrieval_is_tenant_scoped() {
    let h = harness("ok");
    add(&h, document("a-1", "acme", "Acme revenue", "Acme revenue was $1.2M.")).await;
    add(&h, document("g-1", "globex", "Globex revenue", "Globex revenue was $9M.")).await;

    let acme = h.engine.retrieve("u-acme", "revenue", None).await.unwrap();
    assert_eq!(acme.total_results, 1);
    assert_eq!(acme.results[0].document_id, "a-1");

    let globex = h.engine.retrieve("u-globex", "revenue", None).await.unwrap();
    assert_eq!(globex.total_results, 1);
    assert_eq!(globex.results[0].document_id, "g-1");
}

#[tokio::test]
async fn test_authority_outweighs_closer_match() {
    let h = harness("ok");
    // The note matches the query more closely, but budget content is FINANCIAL
    add(&h, document("c-1", "acme", "note", "pricing discussion")).await;
    add(&h, document("f-1", "acme", "note", "pricing discussion budget")).await;

    let response = h.engine.retrieve("u-acme", "pricing discussion", None).await.unwrap();
    assert_eq!(response.results.len(), 2);
    let top = &response.results[0];
    assert_eq!(top.data_type, DataType::Financial);
    assert!(top.effective_score() >= response.results[1].effective_score());
}

#[tokio::test]
async fn test_unknown_user_is_tenant_not_found() {
    let h = harness("ok");
    let err = h.engine.retrieve("nobody", "revenue", None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::TenantNotFound(id)) if id == "nobody"
    ));
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_no_knowledge() {
    let h = harness_with(Arc::new(BrokenEmbedder), "best effort answer");

    let answer = h.engine.ask("u-acme", "What was Q3 revenue?").await.unwrap();
    let Answer::Generated {
        sources,
        knowledge_available,
        ..
    } = answer
    else {
        panic!("expected a generated answer");
    };
    assert!(!knowledge_available);
    assert!(sources.is_empty());
    assert!(h.generator.last_prompt().contains(NO_KNOWLEDGE_NOTICE));

    // Direct retrieval still reports the failure
    assert!(h.engine.retrieve("u-acme", "revenue", None).await.is_err());
}

#[tokio::test]
async fn test_removed_document_is_not_retrieved() {
    let h = harness("ok");
    add(&h, document("d-1", "acme", "Roadmap", "product roadmap for the beta launch")).await;
    assert_eq!(h.engine.retrieve("u-acme", "roadmap", None).await.unwrap().total_results, 1);

    let removed = h.engine.remove_document("d-1", "acme").await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(h.engine.retrieve("u-acme", "roadmap", None).await.unwrap().total_results, 0);
    assert_eq!(h.store.knowledge_entry_count(), 0);
}

#[tokio::test]
async fn test_digest_is_generated_once_per_day() {
    let h = harness("ok");
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let first = h.engine.generate_digest("u-acme", date, NOW).await.unwrap();
    assert!(matches!(first, DigestOutcome::Generated(_)));
    let second = h.engine.generate_digest("u-acme", date, NOW + 60).await.unwrap();
    let DigestOutcome::Skipped(existing) = second else {
        panic!("second digest for the same day should be skipped");
    };
    assert_eq!(existing.id, first.digest().id);

    h.engine.dismiss_digest("u-acme", date).await.unwrap();
    let other_day = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
    let err = h.engine.dismiss_digest("u-acme", other_day).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::DigestNotFound { .. })
    ));
}

#[tokio::test]
async fn test_log_interaction_bumps_last_contacted() {
    let h = harness("ok");
    h.store
        .insert_contact(Contact {
            id: "c-1".into(),
            user_id: "u-acme".into(),
            name: "Dana".into(),
            email: "dana@partner.io".into(),
            company: Some("partner".into()),
            title: None,
            tier: ContactTier::Inner,
            last_contacted_at: Some(NOW - 86_400),
            created_at: NOW - 10 * 86_400,
        })
        .unwrap();

    let interaction = h
        .engine
        .log_interaction("u-acme", "Dana@Partner.io", InteractionKind::Call, "pricing call", NOW)
        .await
        .unwrap();
    assert_eq!(interaction.contact_id, "c-1");
    assert_eq!(h.store.contact("c-1").unwrap().last_contacted_at, Some(NOW));
    assert_eq!(h.store.interaction_count(), 1);

    let missing = h
        .engine
        .log_interaction("u-acme", "ghost@nowhere.io", InteractionKind::Note, "?", NOW)
        .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_brief_parses_generated_sections() {
    let h = harness(
        r#"Here you go: {"talkingPoints": ["Renewal terms"], "questions": ["Budget owner?"], "relevantData": ["Q3 revenue $1.2M"]}"#,
    );
    let report = "Q3 revenue was $1.2M for the renewal.";
    add(&h, document("fin-1", "acme", "Q3 revenue report", report)).await;
    h.store
        .insert_event(CalendarEvent {
            id: "ev-1".into(),
            user_id: "u-acme".into(),
            title: "Renewal review".into(),
            description: Some("renewal and revenue".into()),
            location: None,
            start_at: NOW + 3_600,
            end_at: NOW + 7_200,
            attendees: vec!["lee@customer.com".into()],
        })
        .unwrap();

    let brief = h.engine.generate_brief("u-acme", "ev-1", NOW).await.unwrap();
    assert_eq!(brief.event_id, "ev-1");
    assert_eq!(brief.content.event_title, "Renewal review");
    assert_eq!(brief.content.talking_points, vec!["Renewal terms".to_string()]);
    assert_eq!(brief.content.questions, vec!["Budget owner?".to_string()]);
    assert_eq!(brief.content.attendees.len(), 1);
    assert_eq!(brief.content.attendees[0].email, "lee@customer.com");
    assert_eq!(h.generator.calls(), 1);

    let stored = h.store.get_brief("ev-1").await.unwrap().unwrap();
    assert_eq!(stored.content, brief.content);

    let err = h.engine.generate_brief("u-acme", "missing", NOW).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::EventNotFound(_))
    ));
}
