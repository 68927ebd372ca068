//! Text-generation collaborators.
//!
//! [`ChatGenerator`] talks to any OpenAI-compatible `chat/completions`
//! endpoint (OpenAI, LM Studio, vLLM, Ollama's `/v1`). The system prompt is
//! sent as the first message, followed by the caller's messages.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use synapse_core::generation::{Completion, TextGenerator};
use synapse_core::models::ChatMessage;
use synapse_core::EngineError;

use crate::config::GenerationConfig;
use crate::embedding::send_with_retry;

const GENERATION_RETRIES: u32 = 2;

pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(ChatGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: &str,
        _max_tokens: u32,
    ) -> Result<Completion> {
        Err(EngineError::ProviderDisabled("generation".to_string()).into())
    }
}

pub struct ChatGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ChatGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for openai provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.base_url),
            model,
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}

/// Resolve the chat completions endpoint from a base URL.
fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

fn request_messages(messages: &[ChatMessage], system_prompt: &str) -> Vec<serde_json::Value> {
    std::iter::once(serde_json::json!({ "role": "system", "content": system_prompt }))
        .chain(messages.iter().map(|m| {
            serde_json::json!({ "role": m.role.as_str(), "content": m.content })
        }))
        .collect()
}

/// `choices[0].message.content` plus `usage.completion_tokens`.
fn parse_completion(json: &serde_json::Value) -> Result<Completion> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| anyhow!("chat response has no choices"))?;
    let text = choice["message"]["content"].as_str().unwrap_or("").to_string();
    let output_tokens = json["usage"]["completion_tokens"]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    Ok(Completion {
        text,
        output_tokens,
    })
}

#[async_trait]
impl TextGenerator for ChatGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request_messages(messages, system_prompt),
            "temperature": 0.3,
            "max_tokens": max_tokens,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let json = send_with_retry("chat", request, GENERATION_RETRIES).await?;
        parse_completion(&json)
    }
}
