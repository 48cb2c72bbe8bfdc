//! Generation providers and the retrying adapter around them.
//!
//! - **[`DisabledGenerator`]**: always fails.
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions`, single user message.
//! - **[`GeminiGenerator`]**: `POST /v1beta/{model}:generateContent`.
//!
//! [`GeneratorAdapter`] wraps any provider with the shared [`RetryPolicy`]
//! and implements [`TextGenerator`] for the orchestrator and the judge.
//! Calls are stateless; there is no caching and no streaming.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use decision_twin_core::generation::{GenerationProvider, TextGenerator};
use decision_twin_core::{ProviderError, TwinError};
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::embedding::{api_key, gemini_model_path, http_client, send_json};
use crate::retry::RetryPolicy;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Instantiate the provider named by `generation.provider`, optionally
/// overriding the model (the judge may use a different one).
pub fn create_generator(
    config: &GenerationConfig,
    model_override: Option<&str>,
) -> Result<Arc<dyn GenerationProvider>> {
    let model = model_override
        .map(str::to_string)
        .or_else(|| config.model.clone());
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config, require_model(model)?)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config, require_model(model)?)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

fn require_model(model: Option<String>) -> Result<String> {
    model.ok_or_else(|| anyhow::anyhow!("generation.model required"))
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, ProviderError> {
        Err(ProviderError::Permanent(
            "generation provider is disabled; set [generation] provider in the config".to_string(),
        ))
    }
}

// ============ OpenAI ============

/// Chat completions with a single user message. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    temperature: Option<f32>,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, model: String) -> Result<Self> {
        Ok(Self {
            model,
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: api_key("OPENAI_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);
        parse_openai_completion(&send_json(request).await?)
    }
}

fn parse_openai_completion(json: &Value) -> std::result::Result<String, ProviderError> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::Permanent("invalid OpenAI response: missing choices[0].message.content".to_string())
        })
}

// ============ Gemini ============

/// `generateContent` with a single user turn. Requires `GEMINI_API_KEY`.
pub struct GeminiGenerator {
    model: String,
    temperature: Option<f32>,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, model: String) -> Result<Self> {
        Ok(Self {
            model: gemini_model_path(&model),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: api_key("GEMINI_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let mut body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        if let Some(t) = self.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": t });
        }
        let request = self
            .client
            .post(format!(
                "{}/v1beta/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        parse_gemini_completion(&send_json(request).await?)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_completion(json: &Value) -> std::result::Result<String, ProviderError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("missing candidates[0].content.parts");
            ProviderError::Permanent(format!("invalid Gemini response: {}", reason))
        })?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ Adapter ============

/// Retries a [`GenerationProvider`] and maps exhaustion to [`TwinError::Generation`].
pub struct GeneratorAdapter {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
}

impl GeneratorAdapter {
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn from_config(provider: Arc<dyn GenerationProvider>, config: &GenerationConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        )
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

#[async_trait]
impl TextGenerator for GeneratorAdapter {
    async fn generate(&self, prompt: &str) -> decision_twin_core::Result<String> {
        let provider = &self.provider;
        self.retry
            .execute("generation", || provider.generate(prompt))
            .await
            .map_err(|e| TwinError::Generation {
                attempts: e.attempts,
                cause: e.cause,
            })
    }
}
