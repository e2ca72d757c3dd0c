//! Text-generation providers behind the core [`Generator`] trait.
//!
//! `openai` talks to any OpenAI-compatible chat completions API (OpenAI,
//! Groq, vLLM, ...); `ollama` to a local Ollama instance. Both send the
//! system instructions, the attributed FAQ context, the trimmed history as
//! alternating user/assistant messages, and finally the question.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use faq_harness_core::models::Turn;
use faq_harness_core::traits::Generator;

use crate::config::GenerationConfig;
use crate::retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" | "ollama" => Ok(Arc::new(HttpGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Every call fails; the router turns that into an `Error: ...` reply.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn complete(&self, _: &str, _: &str, _: &[Turn], _: &str) -> Result<String> {
        bail!("text generation is disabled")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAI,
    Ollama,
}

pub struct HttpGenerator {
    flavor: Flavor,
    model: String,
    url: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model must be specified"))?;
        let (flavor, default_url, api_key) = match config.provider.as_str() {
            "openai" => {
                let key = std::env::var(&config.api_key_env).map_err(|_| {
                    anyhow::anyhow!("{} environment variable not set", config.api_key_env)
                })?;
                (Flavor::OpenAI, OPENAI_DEFAULT_URL, Some(key))
            }
            "ollama" => (Flavor::Ollama, OLLAMA_DEFAULT_URL, None),
            other => bail!("Unknown generation provider: {}", other),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            flavor,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, messages: Vec<Value>) -> Value {
        match self.flavor {
            Flavor::OpenAI => json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }),
            Flavor::Ollama => json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": self.temperature,
                    "num_predict": self.max_tokens,
                },
            }),
        }
    }
}

/// Chat messages for one completion request.
fn build_messages(system: &str, context: &str, history: &[Turn], user_input: &str) -> Vec<Value> {
    let system_content = if context.is_empty() {
        system.to_string()
    } else {
        format!("{}\n\nFAQ context:\n{}", system, context)
    };

    let mut messages = vec![json!({ "role": "system", "content": system_content })];
    for turn in history {
        messages.push(json!({ "role": "user", "content": turn.input }));
        messages.push(json!({ "role": "assistant", "content": turn.output }));
    }
    messages.push(json!({ "role": "user", "content": user_input }));
    messages
}

fn parse_completion(flavor: Flavor, json: &Value) -> Result<String> {
    let content = match flavor {
        Flavor::OpenAI => json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content")),
        Flavor::Ollama => json.get("message").and_then(|m| m.get("content")),
    };
    content
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing message content"))
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(
        &self,
        system_instructions: &str,
        context: &str,
        history: &[Turn],
        user_input: &str,
    ) -> Result<String> {
        let body = self.request_body(build_messages(
            system_instructions,
            context,
            history,
            user_input,
        ));
        let (endpoint, service) = match self.flavor {
            Flavor::OpenAI => (format!("{}/chat/completions", self.url), "OpenAI"),
            Flavor::Ollama => (format!("{}/api/chat", self.url), "Ollama"),
        };
        let json = retry::post_json(
            &self.client,
            &endpoint,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            service,
        )
        .await?;
        parse_completion(self.flavor, &json)
    }
}
