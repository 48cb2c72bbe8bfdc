//! Answer orchestration: optional retrieval, prompt construction, generation.
//!
//! [`Orchestrator::answer`] is the single entry point shared by the CLI, the
//! HTTP surface, and the evaluator. It holds only read-only state, so one
//! instance can serve concurrent callers.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::generation::TextGenerator;
use crate::models::RetrievedItem;
use crate::prompt::{build_prompt, format_context, PromptVersion};
use crate::retrieve::Retriever;
use crate::spec::DecisionTwinSpec;
use crate::validate::{check_answer, Compliance};

/// Parameters for one recommendation request.
///
/// Built by each caller from its own inputs; `k` has no default here so
/// callers resolve it against `retrieval.top_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRequest {
    pub query: String,
    pub use_rag: bool,
    pub prompt_version: PromptVersion,
    pub k: usize,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>, use_rag: bool, prompt_version: PromptVersion, k: usize) -> Self {
        Self {
            query: query.into(),
            use_rag,
            prompt_version,
            k,
        }
    }
}

/// A generated recommendation plus everything needed to audit it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer_text: String,
    /// Empty when retrieval was disabled.
    pub retrieved: Vec<RetrievedItem>,
    /// The exact prompt sent to the generator.
    pub prompt: String,
    pub query: String,
    pub use_rag: bool,
    pub prompt_version: PromptVersion,
    pub k: usize,
    pub compliance: Compliance,
}

#[derive(Clone)]
pub struct Orchestrator {
    retriever: Retriever,
    generator: Arc<dyn TextGenerator>,
    spec: Arc<DecisionTwinSpec>,
}

impl Orchestrator {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn TextGenerator>,
        spec: Arc<DecisionTwinSpec>,
    ) -> Self {
        Self {
            retriever,
            generator,
            spec,
        }
    }

    pub fn spec(&self) -> &DecisionTwinSpec {
        &self.spec
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Produce a recommendation. Retrieval and generation errors propagate.
    pub async fn answer(&self, request: &AnswerRequest) -> Result<Answer> {
        let retrieved = if request.use_rag {
            self.retriever.retrieve(&request.query, request.k).await?
        } else {
            Vec::new()
        };

        let context = format_context(&retrieved);
        let prompt = build_prompt(request.prompt_version, &request.query, &context, &self.spec);
        debug!(
            version = %request.prompt_version,
            use_rag = request.use_rag,
            chunks = retrieved.len(),
            prompt_chars = prompt.len(),
            "built prompt"
        );

        let answer_text = self.generator.generate(&prompt).await?;

        let retrieved_ids: Vec<String> = retrieved.iter().map(|r| r.chunk_id.clone()).collect();
        let compliance = check_answer(&answer_text, &self.spec, &retrieved_ids, request.prompt_version);
        if !compliance.is_clean() {
            warn!(
                action = ?compliance.action,
                action_in_set = compliance.action_in_set,
                unknown_citations = ?compliance.unknown_citations,
                meets_citation_minimum = compliance.meets_citation_minimum,
                "answer does not follow the decision rules"
            );
        }

        Ok(Answer {
            answer_text,
            retrieved,
            prompt,
            query: request.query.clone(),
            use_rag: request.use_rag,
            prompt_version: request.prompt_version,
            k: request.k,
            compliance,
        })
    }
}
