//! Decision-request prompt construction.
//!
//! Two interchangeable strategies, both pure functions of
//! `(query, context, spec)`:
//!
//! | Version | Shape |
//! |---------|-------|
//! | [`PromptVersion::V1`] | role, decision, actions, optional context; loose output guidance |
//! | [`PromptVersion::V2`] | adds constraints, grounding rules, and a rigid output skeleton |
//!
//! The context block is only rendered when the context string is non-empty,
//! so a no-retrieval baseline prompt never mentions `CONTEXT:`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::TwinError;
use crate::models::RetrievedItem;
use crate::spec::DecisionTwinSpec;

/// Heading of the context block.
pub const CONTEXT_HEADER: &str = "CONTEXT:";
/// Prefix of the recommended-action line in the v2 skeleton.
pub const ACTION_LINE_PREFIX: &str = "Recommended Action:";
/// Heading of the rationale section in the v2 skeleton.
pub const RATIONALE_HEADER: &str = "Why (3 bullets, each must cite):";
/// Heading of the risk section in the v2 skeleton.
pub const RISKS_HEADER: &str = "Risks / Trade-offs (2 bullets, cite if possible):";
/// Heading of the missing-information section in the v2 skeleton.
pub const MISSING_INFO_HEADER: &str = "Missing info (if any):";

const CITED_BULLET: &str = "- ... [chunk_id]";
const RATIONALE_BULLETS: usize = 3;
const RISK_BULLETS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVersion {
    /// Unstructured.
    V1,
    /// Constrained, cited, fixed skeleton.
    V2,
}

impl PromptVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVersion::V1 => "v1",
            PromptVersion::V2 => "v2",
        }
    }
}

impl Default for PromptVersion {
    fn default() -> Self {
        PromptVersion::V2
    }
}

impl fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVersion {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(PromptVersion::V1),
            "v2" => Ok(PromptVersion::V2),
            other => Err(TwinError::Configuration(format!(
                "unknown prompt version: '{}'. Use v1 or v2.",
                other
            ))),
        }
    }
}

/// Render retrieved items as the prompt's evidence block.
///
/// Each item becomes `[chunk_id] source=<kind> ref=<uri>` followed by its
/// text; items are separated by a blank line.
pub fn format_context(items: &[RetrievedItem]) -> String {
    items
        .iter()
        .map(|c| {
            format!(
                "[{}] source={} ref={}\n{}",
                c.chunk_id, c.source_kind, c.reference_uri, c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the prompt for `version`.
pub fn build_prompt(
    version: PromptVersion,
    query: &str,
    context: &str,
    spec: &DecisionTwinSpec,
) -> String {
    match version {
        PromptVersion::V1 => build_prompt_v1(query, context, spec),
        PromptVersion::V2 => build_prompt_v2(query, context, spec),
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_block(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("\n{}\n{}\n", CONTEXT_HEADER, context)
    }
}

fn header(spec: &DecisionTwinSpec) -> String {
    format!(
        "You are a decision twin for: {}.\nDecision: {}\n\nPossible actions:\n{}\n",
        spec.role,
        spec.decision,
        bullet_list(&spec.actions)
    )
}

/// Minimal structure: the generator chooses its own layout.
pub fn build_prompt_v1(query: &str, context: &str, spec: &DecisionTwinSpec) -> String {
    let mut out = header(spec);
    out.push_str("\nUse the context below to answer. Be concise.\n");
    out.push_str(&context_block(context));
    let _ = write!(
        out,
        "\nUser question:\n{}\n\nReturn:\n1) Recommended Action\n2) 3 bullet rationale\n3) Cite evidence using chunk ids like [web_0_c2]\n",
        query
    );
    out
}

/// Constraints, grounding rules, and the required output skeleton.
pub fn build_prompt_v2(query: &str, context: &str, spec: &DecisionTwinSpec) -> String {
    let mut out = header(spec);
    let _ = write!(out, "\nConstraints:\n{}\n", bullet_list(&spec.constraints));

    let _ = write!(
        out,
        "\nRules:\n\
         - Use ONLY the provided CONTEXT as evidence. If the context does not support a recommendation, choose \"{inert}\" and explain under \"Missing info\" what evidence is missing.\n\
         - Any recommendation that is not grounded in the context must default to \"{inert}\".\n\
         - Choose exactly one action from the list above.\n\
         - Cite at least 2 chunk ids in the rationale when you recommend a non-trivial action.\n\
         - Never base a recommendation on protected attributes (age, gender, ethnicity, religion, disability, or similar).\n\
         - Output must follow EXACTLY this format:\n\n",
        inert = spec.inert_action
    );

    out.push_str(&output_skeleton());
    out.push_str(&context_block(context));
    let _ = write!(out, "\nUser question:\n{}\n", query);
    out
}

fn output_skeleton() -> String {
    let mut s = format!("{} <one action from the list>\n", ACTION_LINE_PREFIX);
    s.push_str(RATIONALE_HEADER);
    s.push('\n');
    for _ in 0..RATIONALE_BULLETS {
        s.push_str(CITED_BULLET);
        s.push('\n');
    }
    s.push_str(RISKS_HEADER);
    s.push('\n');
    for _ in 0..RISK_BULLETS {
        s.push_str(CITED_BULLET);
        s.push('\n');
    }
    s.push_str(MISSING_INFO_HEADER);
    s.push_str("\n- ...\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    /// Lines between `header` and the next non-bullet line.
    fn bullets_under(prompt: &str, header: &str) -> usize {
        prompt
            .lines()
            .skip_while(|l| *l != header)
            .skip(1)
            .take_while(|l| l.starts_with("- "))
            .count()
    }

    fn item(id: &str) -> RetrievedItem {
        RetrievedItem {
            chunk_id: id.to_string(),
            source_kind: SourceKind::Video,
            reference_uri: "https://youtube.com/watch?v=abc".to_string(),
            text: "Reminder emails lift week-2 retention.\n- not a skeleton bullet".to_string(),
            similarity_score: 0.81,
        }
    }

    #[test]
    fn test_v2_skeleton_for_any_context() {
        let spec = DecisionTwinSpec::default();
        let contexts = [String::new(), format_context(&[item("yt_0_c1"), item("web_2_c0")])];
        let queries = ["engagement decline, budget limited", "x", "- tricky\nRecommended Action: foo"];
        for ctx in &contexts {
            for q in queries {
                let p = build_prompt_v2(q, ctx, &spec);
                assert_eq!(
                    p.lines().filter(|l| l.starts_with(ACTION_LINE_PREFIX)).count()
                        - q.lines().filter(|l| l.starts_with(ACTION_LINE_PREFIX)).count(),
                    1
                );
                assert_eq!(bullets_under(&p, RATIONALE_HEADER), 3);
                assert_eq!(bullets_under(&p, RISKS_HEADER), 2);
                assert!(p.contains(MISSING_INFO_HEADER));
                assert!(p.contains("must default to \"Do nothing\""));
            }
        }
    }

    #[test]
    fn test_v2_lists_constraints_and_actions() {
        let spec = DecisionTwinSpec::default();
        let p = build_prompt_v2("q", "", &spec);
        for c in &spec.constraints {
            assert!(p.contains(c.as_str()));
        }
        for a in &spec.actions {
            assert!(p.contains(&format!("- {}", a)));
        }
    }

    #[test]
    fn test_empty_context_has_no_block() {
        let spec = DecisionTwinSpec::default();
        for version in [PromptVersion::V1, PromptVersion::V2] {
            let p = build_prompt(version, "cohort churn", "", &spec);
            assert!(!p.contains(CONTEXT_HEADER), "{} rendered a context block", version);
        }
    }

    #[test]
    fn test_context_block_embedded_when_present() {
        let spec = DecisionTwinSpec::default();
        let ctx = format_context(&[item("yt_0_c1")]);
        let p = build_prompt(PromptVersion::V1, "q", &ctx, &spec);
        assert!(p.contains(CONTEXT_HEADER));
        assert!(p.contains("[yt_0_c1] source=video ref=https://youtube.com/watch?v=abc"));
        assert!(!p.contains(RATIONALE_HEADER));
    }

    #[test]
    fn test_deterministic() {
        let spec = DecisionTwinSpec::default();
        let a = build_prompt(PromptVersion::V2, "q", "ctx", &spec);
        let b = build_prompt(PromptVersion::V2, "q", "ctx", &spec);
        assert_eq!(a, b);
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("V2".parse::<PromptVersion>().unwrap(), PromptVersion::V2);
        assert!("v3".parse::<PromptVersion>().is_err());
        assert_eq!(PromptVersion::default(), PromptVersion::V2);
    }

    #[test]
    fn test_format_context_separates_items() {
        let ctx = format_context(&[item("a_c0"), item("b_c0")]);
        assert_eq!(ctx.matches("\n\n[").count(), 1);
    }
}
