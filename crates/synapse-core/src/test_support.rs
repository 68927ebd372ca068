//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::generation::{Completion, TextGenerator};
use crate::index::memory::InMemoryVectorIndex;
use crate::models::{ChatMessage, Company, Document, User};
use crate::retrieval::Knowledge;
use crate::store::memory::InMemoryStore;

/// Bag-of-words embedder: each lowercase token bumps one FNV-hashed bucket.
pub struct WordEmbedder;

pub const WORD_DIMS: usize = 64;

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        "test-words"
    }

    fn dims(&self) -> usize {
        WORD_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; WORD_DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % WORD_DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub index: Arc<InMemoryVectorIndex>,
    pub kb: Knowledge,
}

/// Two tenants (`acme`, `globex`) with one user each (`u-acme`, `u-globex`).
pub fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let index = Arc::new(InMemoryVectorIndex::new());
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
    let kb = Knowledge::new(Arc::new(WordEmbedder), index.clone(), store.clone());
    Fixture { store, index, kb }
}

pub fn document(id: &str, company: &str, title: &str, content: &str) -> Document {
    Document {
        id: id.into(),
        company_id: company.into(),
        title: title.into(),
        content: content.into(),
        content_type: "text/plain".into(),
        source_url: None,
        is_excluded: false,
        created_at: 0,
        updated_at: 0,
    }
}

/// Returns a fixed reply and records every prompt it was sent.
pub struct ScriptedGenerator {
    reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _system_prompt: &str,
        _max_tokens: u32,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
        self.prompts.lock().unwrap().push(prompt);
        Ok(Completion {
            text: self.reply.clone(),
            output_tokens: 42,
        })
    }
}
