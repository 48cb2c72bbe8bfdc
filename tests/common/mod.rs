//! Deterministic in-process providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use decision_twin::embedding::EmbedderAdapter;
use decision_twin::retry::RetryPolicy;
use decision_twin_core::embedding::EmbeddingProvider;
use decision_twin_core::generation::TextGenerator;
use decision_twin_core::models::{Document, SourceKind};
use decision_twin_core::{ProviderError, TwinError};

/// Topic words; each maps to one vector dimension.
pub const TOPICS: [&str; 4] = ["email", "discount", "support", "onboarding"];

/// Bag-of-topics embedding with a small constant component so no vector is zero.
pub struct TopicEmbedder {
    pub calls: AtomicUsize,
}

impl TopicEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn topic_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = TOPICS
        .iter()
        .map(|t| lower.matches(t).count() as f32)
        .collect();
    v.push(0.1);
    v
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic-test"
    }
    fn dims(&self) -> usize {
        TOPICS.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| topic_vector(t)).collect())
    }
}

pub fn adapter(provider: Arc<TopicEmbedder>) -> EmbedderAdapter {
    EmbedderAdapter::new(provider, RetryPolicy::new(2, 1, 1), 2, Duration::ZERO)
}

pub fn corpus() -> Vec<Document> {
    vec![
        Document {
            doc_id: "web_0".to_string(),
            source_kind: SourceKind::Web,
            reference_uri: "https://example.com/reminders".to_string(),
            raw_text: "A reminder email sent after a week of inactivity recovers lapsed users. \
                       Keep the email short and link straight to the feature they used last."
                .to_string(),
        },
        Document {
            doc_id: "web_1".to_string(),
            source_kind: SourceKind::Web,
            reference_uri: "https://example.com/incentives".to_string(),
            raw_text: "A limited-time discount works for high value cohorts, but a discount \
                       trains users to wait for the next discount."
                .to_string(),
        },
        Document {
            doc_id: "yt_0".to_string(),
            source_kind: SourceKind::Video,
            reference_uri: "https://youtube.com/watch?v=abc123".to_string(),
            raw_text: "welcome back today we talk onboarding checklists and why onboarding \
                       completion predicts retention"
                .to_string(),
        },
        Document {
            doc_id: "other_0".to_string(),
            source_kind: SourceKind::Other,
            reference_uri: "file:///notes/support.md".to_string(),
            raw_text: "Escalate to human support when support tickets repeat the same complaint."
                .to_string(),
        },
    ]
}

/// Answers every prompt with a fixed, rule-following v2 response.
pub struct ScriptedAnswer;

pub const SCRIPTED_ANSWER: &str = "Recommended Action: Send educational reminder\n\
    Why (3 bullets, each must cite):\n\
    - A short reminder email recovers lapsed users [web_0_c0]\n\
    - Linking to the last used feature lifts return rate [web_0_c0]\n\
    - Discounts train users to wait [web_1_c0]\n\
    Risks / Trade-offs (2 bullets, cite if possible):\n\
    - Reminder fatigue [web_0_c0]\n\
    - Low reach if emails are ignored\n\
    Missing info:\n\
    - Channel preferences";

#[async_trait]
impl TextGenerator for ScriptedAnswer {
    async fn generate(&self, _prompt: &str) -> decision_twin_core::Result<String> {
        Ok(SCRIPTED_ANSWER.to_string())
    }
}

/// Judge that scores 4/3/4/5, except for prompts mentioning `poison`,
/// which get a reply with no JSON in it.
pub struct ScriptedJudge {
    pub calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedJudge {
    async fn generate(&self, prompt: &str) -> decision_twin_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("poison") {
            return Ok("I would rate this response quite highly overall.".to_string());
        }
        Ok("```json\n{\"relevance\": 4, \"faithfulness\": 3, \"citation_quality\": \"4\", \
            \"actionability\": 5.0, \"brief_justification\": \"Grounded and specific.\"}\n```"
            .to_string())
    }
}

/// A generator whose provider is permanently out of quota.
pub struct Exhausted;

#[async_trait]
impl TextGenerator for Exhausted {
    async fn generate(&self, _prompt: &str) -> decision_twin_core::Result<String> {
        Err(TwinError::Generation {
            attempts: 3,
            cause: ProviderError::Transient("HTTP 429: quota exhausted".to_string()),
        })
    }
}
