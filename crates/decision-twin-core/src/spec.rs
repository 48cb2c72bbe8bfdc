//! The decision twin persona: role, decision, closed action set, constraints.
//!
//! Loaded once from the `[twin]` config section (or the built-in retention
//! manager defaults) and shared read-only by every prompt.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TwinError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTwinSpec {
    /// Who the twin stands in for, e.g. `"Retention / CRM Manager"`.
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_decision")]
    pub decision: String,
    /// The closed set of permissible recommendations.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
    #[serde(default = "default_constraints")]
    pub constraints: Vec<String>,
    /// Fallback when the evidence is insufficient. Must be one of `actions`.
    #[serde(default = "default_inert_action")]
    pub inert_action: String,
}

fn default_role() -> String {
    "Retention / CRM Manager".to_string()
}

fn default_decision() -> String {
    "Recommend the next best retention action for a user cohort".to_string()
}

fn default_actions() -> Vec<String> {
    [
        "Do nothing",
        "Send educational reminder",
        "Send personalized highlight notification",
        "Offer limited-time incentive",
        "Escalate to human support",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_constraints() -> Vec<String> {
    [
        "Must cite evidence from retrieved context",
        "If evidence is insufficient, recommend 'Do nothing' and explain what data is missing",
        "Avoid discriminatory recommendations based on protected attributes",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_inert_action() -> String {
    "Do nothing".to_string()
}

impl Default for DecisionTwinSpec {
    fn default() -> Self {
        Self {
            role: default_role(),
            decision: default_decision(),
            actions: default_actions(),
            constraints: default_constraints(),
            inert_action: default_inert_action(),
        }
    }
}

impl DecisionTwinSpec {
    /// Check required fields. A spec that fails here is a fatal configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.role.trim().is_empty() {
            return Err(TwinError::Configuration("twin.role must not be empty".to_string()));
        }
        if self.decision.trim().is_empty() {
            return Err(TwinError::Configuration(
                "twin.decision must not be empty".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(TwinError::Configuration(
                "twin.actions must list at least one action".to_string(),
            ));
        }
        if self.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(TwinError::Configuration(
                "twin.actions must not contain empty entries".to_string(),
            ));
        }
        if !self.actions.contains(&self.inert_action) {
            return Err(TwinError::Configuration(format!(
                "twin.inert_action '{}' is not one of twin.actions",
                self.inert_action
            )));
        }
        Ok(())
    }

    /// Case-insensitive lookup of an action in the closed set, returning the canonical spelling.
    pub fn find_action(&self, candidate: &str) -> Option<&str> {
        let needle = candidate.trim().trim_end_matches('.').to_lowercase();
        self.actions
            .iter()
            .find(|a| a.to_lowercase() == needle)
            .map(|a| a.as_str())
    }
}
