//! LLM-as-judge scoring of generated answers.
//!
//! The judge model sees the query, a truncated view of the retrieved
//! evidence, and the answer, and must reply with a JSON object scoring four
//! dimensions on a 1–5 scale. Parsing that reply is a fallible boundary:
//! [`parse_scores`] returns [`TwinError::JudgeScoring`] on anything it cannot
//! read, and [`Judge::score`] turns every failure into a zero-sentinel
//! [`Verdict`] so an evaluation run never aborts on one bad reply.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, TwinError};
use crate::generation::TextGenerator;
use crate::models::{Dimension, DimensionScores, RetrievedItem};

/// Characters of each retrieved chunk shown to the judge.
pub const JUDGE_EXCERPT_CHARS: usize = 200;

const NO_CONTEXT: &str = "(none - no RAG)";

const RUBRIC: &str = r#"You are an expert evaluator for a Retention Decision Twin, an AI system that recommends retention actions for user cohorts.

Score the following RESPONSE to the given QUERY on each dimension (1-5 scale):

1. **Relevance** (1-5): Does the response directly address the query's scenario? Does the recommended action make sense for the described situation?
   - 1 = Completely off-topic or generic
   - 3 = Partially addresses the scenario
   - 5 = Precisely tailored to the described scenario

2. **Faithfulness** (1-5): Is the response grounded in the provided context (if any)? Does it avoid hallucinating facts not present in the retrieved chunks?
   - 1 = Largely fabricated claims
   - 3 = Mix of grounded and unsupported claims
   - 5 = Every claim is traceable to provided context
   (If no context was provided, score based on whether claims are reasonable and not fabricated.)

3. **Citation Quality** (1-5): Are chunk IDs cited correctly and meaningfully? Do citations actually support the claims they're attached to?
   - 1 = No citations or completely wrong citations
   - 3 = Some citations present but inconsistent
   - 5 = Every key claim is properly cited with correct chunk IDs
   (If no context was provided, max score is 2 since citations are impossible.)

4. **Actionability** (1-5): Is the recommendation specific and practical enough for a CRM manager to act on? Does it include useful trade-offs or next steps?
   - 1 = Vague platitudes with no clear next step
   - 3 = Clear recommendation but missing nuance
   - 5 = Specific, practical, includes risks/trade-offs and missing info

QUERY:
{query}

CONTEXT PROVIDED (retrieved chunks):
{context}

RESPONSE TO EVALUATE:
{response}

Respond with ONLY a JSON object (no markdown, no backticks):
{"relevance": <int>, "faithfulness": <int>, "citation_quality": <int>, "actionability": <int>, "brief_justification": "<1-2 sentence explanation>"}
"#;

/// The judge's decision on one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub scores: DimensionScores,
    pub justification: String,
    /// Present when `scores` is the sentinel.
    pub error: Option<String>,
}

impl Verdict {
    /// Zero scores with a `"Scoring error: ..."` justification.
    pub fn sentinel(err: &TwinError) -> Self {
        Self {
            scores: DimensionScores::SENTINEL,
            justification: format!("Scoring error: {}", err),
            error: Some(err.to_string()),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.error.is_some()
    }
}

/// `[chunk_id]: <first 200 chars>...` per item, one per line.
pub fn judge_context(items: &[RetrievedItem]) -> String {
    items
        .iter()
        .map(|c| {
            let excerpt: String = c.text.chars().take(JUDGE_EXCERPT_CHARS).collect();
            format!("[{}]: {}...", c.chunk_id, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_judge_prompt(query: &str, response: &str, context: &str) -> String {
    let context = if context.is_empty() { NO_CONTEXT } else { context };
    RUBRIC
        .replace("{query}", query)
        .replace("{context}", context)
        .replace("{response}", response)
}

/// Parse a judge reply into clamped scores and a justification.
///
/// Tolerates surrounding markdown fences and prose around the JSON object,
/// and numeric values given as floats or strings.
pub fn parse_scores(reply: &str) -> Result<(DimensionScores, String)> {
    let body = strip_fences(reply.trim());
    let json = extract_object(body)
        .ok_or_else(|| TwinError::JudgeScoring(format!("no JSON object in reply: {}", preview(reply))))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| TwinError::JudgeScoring(format!("invalid JSON ({}): {}", e, preview(reply))))?;

    let mut scores = DimensionScores::default();
    for dim in Dimension::ALL {
        let raw = value
            .get(dim.key())
            .ok_or_else(|| TwinError::JudgeScoring(format!("missing '{}'", dim.key())))?;
        let n = as_integer(raw).ok_or_else(|| {
            TwinError::JudgeScoring(format!("'{}' is not a number: {}", dim.key(), raw))
        })?;
        let clamped = n.clamp(1, 5) as u8;
        match dim {
            Dimension::Relevance => scores.relevance = clamped,
            Dimension::Faithfulness => scores.faithfulness = clamped,
            Dimension::CitationQuality => scores.citation_quality = clamped,
            Dimension::Actionability => scores.actionability = clamped,
        }
    }

    let justification = value
        .get("brief_justification")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok((scores, justification))
}

fn strip_fences(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Integer value of a JSON number or numeric string, truncating fractions.
fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(120).collect();
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Times the judge is asked before a reply that will not parse is recorded
/// as a sentinel.
pub const DEFAULT_PARSE_ATTEMPTS: u32 = 3;

/// Scores answers with a generation model.
#[derive(Clone)]
pub struct Judge {
    generator: Arc<dyn TextGenerator>,
    parse_attempts: u32,
}

impl Judge {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            parse_attempts: DEFAULT_PARSE_ATTEMPTS,
        }
    }

    /// Ask again up to `attempts` times in total when the reply is malformed.
    /// Generation failures are not re-asked; the generator already retries them.
    pub fn with_parse_attempts(mut self, attempts: u32) -> Self {
        self.parse_attempts = attempts.max(1);
        self
    }

    /// Score one answer. Never fails: errors become a sentinel verdict.
    pub async fn score(&self, query: &str, response: &str, retrieved: &[RetrievedItem]) -> Verdict {
        let prompt = build_judge_prompt(query, response, &judge_context(retrieved));
        let mut last_error = None;
        for attempt in 1..=self.parse_attempts {
            let reply = match self.generator.generate(&prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            };
            match parse_scores(&reply) {
                Ok((scores, justification)) => {
                    return Verdict {
                        scores,
                        justification,
                        error: None,
                    }
                }
                Err(e) => {
                    debug!(attempt, error = %e, "judge reply did not parse");
                    last_error = Some(e);
                }
            }
        }

        let e = last_error
            .unwrap_or_else(|| TwinError::JudgeScoring("judge was never asked".to_string()));
        warn!(error = %e, "judge scoring failed, recording sentinel scores");
        Verdict::sentinel(&e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::SourceKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Reply(std::result::Result<String, ()>);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|_| TwinError::Generation {
                attempts: 3,
                cause: ProviderError::Transient("HTTP 429: quota".to_string()),
            })
        }
    }

    /// Replies from a fixed script, one entry per call, counting calls.
    struct Sequence {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl Sequence {
        fn new(replies: Vec<&'static str>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Sequence {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.replies[i.min(self.replies.len() - 1)].to_string())
        }
    }

    const GOOD: &str = r#"{"relevance": 4, "faithfulness": 4, "citation_quality": 4, "actionability": 4}"#;

    #[test]
    fn test_parse_plain_json() {
        let (s, j) = parse_scores(
            r#"{"relevance": 4, "faithfulness": 5, "citation_quality": 3, "actionability": 4, "brief_justification": "Solid."}"#,
        )
        .unwrap();
        assert_eq!((s.relevance, s.faithfulness, s.citation_quality, s.actionability), (4, 5, 3, 4));
        assert_eq!(j, "Solid.");
    }

    #[test]
    fn test_parse_fenced_and_clamped() {
        let reply = "```json\n{\"relevance\": 9, \"faithfulness\": 0, \"citation_quality\": \"2\", \"actionability\": 3.7}\n```";
        let (s, j) = parse_scores(reply).unwrap();
        assert_eq!((s.relevance, s.faithfulness, s.citation_quality, s.actionability), (5, 1, 2, 3));
        assert!(j.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_scores("I think it's great!"), Err(TwinError::JudgeScoring(_))));
        assert!(matches!(
            parse_scores(r#"{"relevance": 4, "faithfulness": 5}"#),
            Err(TwinError::JudgeScoring(_))
        ));
        assert!(matches!(
            parse_scores(r#"{"relevance": "high", "faithfulness": 5, "citation_quality": 3, "actionability": 4}"#),
            Err(TwinError::JudgeScoring(_))
        ));
    }

    #[test]
    fn test_judge_context_truncates_on_char_boundary() {
        let item = RetrievedItem {
            chunk_id: "web_0_c0".to_string(),
            source_kind: SourceKind::Web,
            reference_uri: "u".to_string(),
            text: "é".repeat(300),
            similarity_score: 0.9,
        };
        let ctx = judge_context(&[item]);
        assert!(ctx.starts_with("[web_0_c0]: "));
        assert_eq!(ctx.chars().filter(|c| *c == 'é').count(), JUDGE_EXCERPT_CHARS);
        assert!(ctx.ends_with("..."));
    }

    #[test]
    fn test_prompt_marks_missing_context() {
        let p = build_judge_prompt("q", "r", "");
        assert!(p.contains(NO_CONTEXT));
        assert!(p.contains("\"citation_quality\": <int>"));
    }

    #[tokio::test]
    async fn test_malformed_reply_becomes_sentinel() {
        let judge = Judge::new(Arc::new(Reply(Ok("not json at all".to_string()))));
        let v = judge.score("q", "answer", &[]).await;
        assert_eq!(v.scores, DimensionScores::SENTINEL);
        assert!(v.justification.starts_with("Scoring error:"));
        assert!(v.is_sentinel());
    }

    #[tokio::test]
    async fn test_exhausted_judge_becomes_sentinel() {
        let judge = Judge::new(Arc::new(Reply(Err(()))));
        let v = judge.score("q", "answer", &[]).await;
        assert_eq!(v.scores, DimensionScores::SENTINEL);
        assert!(v.justification.contains("quota"));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_asked_again() {
        let generator = Arc::new(Sequence::new(vec!["sounds good to me", GOOD]));
        let judge = Judge::new(generator.clone());
        let v = judge.score("q", "answer", &[]).await;
        assert!(!v.is_sentinel());
        assert_eq!(v.scores.relevance, 4);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parse_attempts_are_capped() {
        let generator = Arc::new(Sequence::new(vec!["nope"]));
        let judge = Judge::new(generator.clone()).with_parse_attempts(2);
        let v = judge.score("q", "answer", &[]).await;
        assert!(v.is_sentinel());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }
}
