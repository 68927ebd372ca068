//! Configuration parsing and validation.
//!
//! Synapse is configured via a TOML file (default: `config/synapse.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/synapse.sqlite"
//!
//! [retrieval]
//! top_k = 5
//!
//! [conflict]
//! triggers = ["revenue", "profit"]
//! variance_threshold = 0.05
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use synapse_core::brief::BriefSettings;
use synapse_core::conflict::ConflictPolicy;
use synapse_core::context::ContextOptions;
use synapse_core::digest::DigestSettings;
use synapse_core::relationship::RelationshipThresholds;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub relationships: RelationshipsConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub brief: BriefConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    synapse_core::retrieval::DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConflictConfig {
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,
    #[serde(default = "default_conflict_top_k")]
    pub top_k: usize,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            triggers: default_triggers(),
            variance_threshold: default_variance_threshold(),
            top_k: default_conflict_top_k(),
        }
    }
}

impl ConflictConfig {
    pub fn policy(&self) -> ConflictPolicy {
        ConflictPolicy {
            triggers: self.triggers.iter().map(|t| t.to_lowercase()).collect(),
            variance_threshold: self.variance_threshold,
            top_k: self.top_k,
        }
    }
}

fn default_triggers() -> Vec<String> {
    synapse_core::conflict::DEFAULT_TRIGGERS
        .iter()
        .map(|t| t.to_string())
        .collect()
}
fn default_variance_threshold() -> f64 {
    synapse_core::conflict::DEFAULT_VARIANCE_THRESHOLD
}
fn default_conflict_top_k() -> usize {
    synapse_core::conflict::DEFAULT_CONFLICT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_context_limit")]
    pub limit: usize,
    #[serde(default = "default_calendar_past_days")]
    pub calendar_past_days: i64,
    #[serde(default = "default_calendar_future_days")]
    pub calendar_future_days: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            limit: default_context_limit(),
            calendar_past_days: default_calendar_past_days(),
            calendar_future_days: default_calendar_future_days(),
        }
    }
}

impl ContextConfig {
    /// All sources enabled, sized from config.
    pub fn options(&self) -> ContextOptions {
        ContextOptions {
            limit: self.limit,
            calendar_past_days: self.calendar_past_days,
            calendar_future_days: self.calendar_future_days,
            ..Default::default()
        }
    }
}

fn default_context_limit() -> usize {
    synapse_core::context::DEFAULT_LIMIT
}
fn default_calendar_past_days() -> i64 {
    synapse_core::context::DEFAULT_CALENDAR_PAST_DAYS
}
fn default_calendar_future_days() -> i64 {
    synapse_core::context::DEFAULT_CALENDAR_FUTURE_DAYS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_vector_timeout_secs(),
        }
    }
}

fn default_vector_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_generation_base_url(),
            model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelationshipsConfig {
    #[serde(default = "default_inner_days")]
    pub inner_days: i64,
    #[serde(default = "default_active_days")]
    pub active_days: i64,
    #[serde(default = "default_casual_days")]
    pub casual_days: i64,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        Self {
            inner_days: default_inner_days(),
            active_days: default_active_days(),
            casual_days: default_casual_days(),
        }
    }
}

impl RelationshipsConfig {
    pub fn thresholds(&self) -> RelationshipThresholds {
        RelationshipThresholds {
            inner_days: self.inner_days,
            active_days: self.active_days,
            casual_days: self.casual_days,
        }
    }
}

fn default_inner_days() -> i64 {
    14
}
fn default_active_days() -> i64 {
    30
}
fn default_casual_days() -> i64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default = "default_top_senders")]
    pub top_senders: usize,
    #[serde(default = "default_reminders")]
    pub reminders: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            top_senders: default_top_senders(),
            reminders: default_reminders(),
        }
    }
}

fn default_top_senders() -> usize {
    5
}
fn default_reminders() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct BriefConfig {
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_per_query_top_k")]
    pub per_query_top_k: usize,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
            per_query_top_k: default_per_query_top_k(),
        }
    }
}

fn default_max_documents() -> usize {
    12
}
fn default_per_query_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl Config {
    pub fn digest_settings(&self) -> DigestSettings {
        DigestSettings {
            thresholds: self.relationships.thresholds(),
            top_senders: self.digest.top_senders,
            reminders: self.digest.reminders,
        }
    }

    pub fn brief_settings(&self) -> BriefSettings {
        BriefSettings {
            thresholds: self.relationships.thresholds(),
            per_query_top_k: self.brief.per_query_top_k,
            max_documents: self.brief.max_documents,
            max_tokens: self.generation.max_tokens,
            ..Default::default()
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.conflict.top_k < 2 {
        bail!("conflict.top_k must be >= 2");
    }
    if !(config.conflict.variance_threshold > 0.0) {
        bail!("conflict.variance_threshold must be > 0");
    }

    if config.context.limit < 1 {
        bail!("context.limit must be >= 1");
    }
    if config.context.calendar_past_days < 0 || config.context.calendar_future_days < 0 {
        bail!("context calendar window must not be negative");
    }

    let rel = &config.relationships;
    if rel.inner_days < 1 || rel.active_days < 1 || rel.casual_days < 1 {
        bail!("relationships thresholds must be >= 1 day");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hashing.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "hashing" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        bail!("generation.model must be specified when provider is 'openai'");
    }

    if config.jobs.max_attempts < 1 {
        bail!("jobs.max_attempts must be >= 1");
    }
    if config.jobs.queue_capacity < 1 {
        bail!("jobs.queue_capacity must be >= 1");
    }

    Ok(config)
}
