//! Embedding providers and the batching adapter around them.
//!
//! Providers implement [`EmbeddingProvider`] from the core crate:
//! - **[`DisabledProvider`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings`.
//! - **[`GeminiProvider`]**: `POST /v1beta/{model}:batchEmbedContents`.
//!
//! Providers make exactly one request per call and classify failures as
//! transient or permanent. [`EmbedderAdapter`] adds batching, the shared
//! [`RetryPolicy`], the pacing delay between batches, and response shape
//! checks. It also implements [`QueryEmbedder`] for the retriever.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Malformed response bodies → fail immediately

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use decision_twin_core::embedding::{EmbeddingProvider, QueryEmbedder};
use decision_twin_core::{ProviderError, TwinError};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Instantiate the provider named by `embedding.provider`.
///
/// API keys are read from the environment here, once.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a JSON request and classify the outcome.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
) -> std::result::Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transient(format!("network error: {}", e)))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| ProviderError::Permanent(format!("invalid JSON response: {}", e)))
}

pub(crate) fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

fn float_array(value: Option<&Value>, what: &str) -> std::result::Result<Vec<f32>, ProviderError> {
    let arr = value
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Permanent(format!("invalid response: missing {}", what)))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::Permanent(format!("invalid response: non-numeric {}", what)))
        })
        .collect()
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Permanent(
            "embedding provider is disabled; set [embedding] provider in the config".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            model,
            dims,
            url,
            api_key: api_key("OPENAI_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);
        parse_openai_response(&send_json(request).await?)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Permanent("invalid OpenAI response: missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, float_array(item.get("embedding"), "embedding")?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API. Requires `GEMINI_API_KEY`.
pub struct GeminiProvider {
    /// Always `models/<name>`.
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

pub(crate) fn gemini_model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Gemini provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());

        Ok(Self {
            model: gemini_model_path(model),
            dims,
            url,
            api_key: api_key("GEMINI_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": t }] },
                    "outputDimensionality": self.dims,
                })
            })
            .collect();
        let request = self
            .client
            .post(format!(
                "{}/v1beta/{}:batchEmbedContents",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }));
        parse_gemini_response(&send_json(request).await?)
    }
}

/// Extract `embeddings[].values`.
fn parse_gemini_response(json: &Value) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let embeddings = json
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Permanent("invalid Gemini response: missing embeddings".to_string()))?;
    embeddings
        .iter()
        .map(|e| float_array(e.get("values"), "values"))
        .collect()
}

// ============ Adapter ============

/// Batching, retrying, pacing front end for an [`EmbeddingProvider`].
pub struct EmbedderAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    pacing: Duration,
}

impl EmbedderAdapter {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        batch_size: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            provider,
            retry,
            batch_size: batch_size.max(1),
            pacing,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
            config.batch_size,
            Duration::from_millis(config.pacing_ms),
        )
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Vector dimensionality the provider reports; 0 when it is not known up front.
    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed every text, preserving order. Any batch that cannot be embedded
    /// aborts the whole call; no partial results are returned.
    pub async fn embed_many(&self, texts: &[String]) -> decision_twin_core::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let total = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let vectors = self.embed_batch(batch).await?;
            out.extend(vectors);
            info!(batch = i + 1, total, embedded = out.len(), "embedded batch");

            if i + 1 < total && !self.pacing.is_zero() {
                debug!(pacing = ?self.pacing, "pacing before next batch");
                tokio::time::sleep(self.pacing).await;
            }
        }
        Ok(out)
    }

    /// Embed one text in a single request.
    pub async fn embed_one(&self, text: &str) -> decision_twin_core::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| TwinError::Embedding {
            attempts: 1,
            cause: ProviderError::Permanent("empty embedding response".to_string()),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> decision_twin_core::Result<Vec<Vec<f32>>> {
        let provider = &self.provider;
        let vectors = self
            .retry
            .execute("embedding", || provider.embed(batch))
            .await
            .map_err(|e| TwinError::Embedding {
                attempts: e.attempts,
                cause: e.cause,
            })?;

        if vectors.len() != batch.len() {
            return Err(TwinError::Embedding {
                attempts: 1,
                cause: ProviderError::Permanent(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )),
            });
        }
        let dims = provider.dims();
        if let Some(bad) = vectors.iter().find(|v| dims > 0 && v.len() != dims) {
            return Err(TwinError::Embedding {
                attempts: 1,
                cause: ProviderError::Permanent(format!(
                    "provider returned a {}-dimensional vector, expected {}",
                    bad.len(),
                    dims
                )),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl QueryEmbedder for EmbedderAdapter {
    async fn embed_query(&self, text: &str) -> decision_twin_core::Result<Vec<f32>> {
        self.embed_one(text).await
    }
}
