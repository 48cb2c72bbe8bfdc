//! Post-hoc compliance check for generated answers.
//!
//! The generator is free-form, so nothing guarantees it picked an action
//! from the closed set or cited chunks that were actually retrieved. This
//! module inspects the text after the fact and reports what it found. It
//! never rewrites the answer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::prompt::{PromptVersion, ACTION_LINE_PREFIX};
use crate::spec::DecisionTwinSpec;

/// Citations required by the v2 rules for a non-inert action.
pub const MIN_CITATIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compliance {
    /// Canonical action if the answer named one from the set, else the raw text.
    pub action: Option<String>,
    pub action_in_set: bool,
    /// Distinct cited chunk ids, in order of first appearance.
    pub citations: Vec<String>,
    /// Cited ids that were not among the retrieved chunks.
    pub unknown_citations: Vec<String>,
    pub meets_citation_minimum: bool,
}

impl Compliance {
    pub fn is_clean(&self) -> bool {
        self.action_in_set && self.unknown_citations.is_empty() && self.meets_citation_minimum
    }
}

/// Inspect `text` against the action set and the retrieved chunk ids.
pub fn check_answer(
    text: &str,
    spec: &DecisionTwinSpec,
    retrieved_ids: &[String],
    version: PromptVersion,
) -> Compliance {
    let raw_action = extract_action(text);
    let canonical = raw_action.as_deref().and_then(|a| spec.find_action(a));
    let action_in_set = canonical.is_some();
    let action = canonical.map(str::to_string).or(raw_action);

    let citations = extract_citations(text);
    let known: BTreeSet<&str> = retrieved_ids.iter().map(String::as_str).collect();
    let unknown_citations = citations
        .iter()
        .filter(|c| !known.contains(c.as_str()))
        .cloned()
        .collect();

    let is_inert = canonical.is_some_and(|a| a == spec.inert_action);
    let meets_citation_minimum = match version {
        PromptVersion::V1 => true,
        PromptVersion::V2 => is_inert || citations.len() >= MIN_CITATIONS,
    };

    Compliance {
        action,
        action_in_set,
        citations,
        unknown_citations,
        meets_citation_minimum,
    }
}

/// Text after the first `Recommended Action:` label, ignoring markdown emphasis.
pub fn extract_action(text: &str) -> Option<String> {
    let label = ACTION_LINE_PREFIX;
    for line in text.lines() {
        let cleaned: String = line.chars().filter(|c| *c != '*' && *c != '#').collect();
        let trimmed = cleaned.trim_start_matches(|c: char| {
            c.is_whitespace() || c.is_ascii_digit() || matches!(c, '-' | ')' | '.')
        });
        let Some(head) = trimmed.get(..label.len()) else {
            continue;
        };
        if head.eq_ignore_ascii_case(label) {
            let value = trimmed[label.len()..].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Distinct bracketed chunk ids such as `[web_0_c2]` or `[yt_1_c0, web_3_c4]`.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        for token in after[..close].split(',') {
            let token = token.trim();
            if looks_like_chunk_id(token) && seen.insert(token.to_string()) {
                out.push(token.to_string());
            }
        }
        rest = &after[close + 1..];
    }
    out
}

fn looks_like_chunk_id(token: &str) -> bool {
    let Some((doc, index)) = token.rsplit_once("_c") else {
        return false;
    };
    !doc.is_empty()
        && !index.is_empty()
        && index.chars().all(|c| c.is_ascii_digit())
        && doc
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    const GOOD: &str = "Recommended Action: Send educational reminder\n\
        Why (3 bullets, each must cite):\n\
        - Reminders recover lapsed users [web_0_c2]\n\
        - Low cost fits the budget [yt_1_c0]\n\
        - Habit loops form early [web_0_c2]\n\
        Risks / Trade-offs (2 bullets, cite if possible):\n\
        - Fatigue [yt_1_c0]\n\
        - Unsubscribes\n\
        Missing info (if any):\n\
        - Channel preferences\n";

    #[test]
    fn test_compliant_answer() {
        let spec = DecisionTwinSpec::default();
        let c = check_answer(GOOD, &spec, &ids(&["web_0_c2", "yt_1_c0"]), PromptVersion::V2);
        assert_eq!(c.action.as_deref(), Some("Send educational reminder"));
        assert!(c.action_in_set);
        assert_eq!(c.citations, ids(&["web_0_c2", "yt_1_c0"]));
        assert!(c.is_clean());
    }

    #[test]
    fn test_unknown_citation_and_off_list_action() {
        let spec = DecisionTwinSpec::default();
        let text = "**Recommended Action:** Launch a loyalty podcast\n- because [web_9_c9]";
        let c = check_answer(text, &spec, &ids(&["web_0_c2"]), PromptVersion::V2);
        assert_eq!(c.action.as_deref(), Some("Launch a loyalty podcast"));
        assert!(!c.action_in_set);
        assert_eq!(c.unknown_citations, ids(&["web_9_c9"]));
        assert!(!c.meets_citation_minimum);
        assert!(!c.is_clean());
    }

    #[test]
    fn test_inert_action_needs_no_citations() {
        let spec = DecisionTwinSpec::default();
        let text = "Recommended Action: Do nothing.\nMissing info (if any):\n- cohort size";
        let c = check_answer(text, &spec, &[], PromptVersion::V2);
        assert_eq!(c.action.as_deref(), Some("Do nothing"));
        assert!(c.meets_citation_minimum);
    }

    #[test]
    fn test_v1_has_no_citation_minimum() {
        let spec = DecisionTwinSpec::default();
        let text = "1) Recommended Action: Offer limited-time incentive";
        let c = check_answer(text, &spec, &[], PromptVersion::V1);
        assert!(c.action_in_set);
        assert!(c.meets_citation_minimum);
    }

    #[test]
    fn test_missing_action_line() {
        let spec = DecisionTwinSpec::default();
        let c = check_answer("I would wait.", &spec, &[], PromptVersion::V2);
        assert_eq!(c.action, None);
        assert!(!c.action_in_set);
    }

    #[test]
    fn test_citation_extraction() {
        let text = "See [web_0_c2, yt_1_c10] and [note] and [web_0_c2] and [a_cx]";
        assert_eq!(extract_citations(text), ids(&["web_0_c2", "yt_1_c10"]));
    }
}
