//! Evaluation configurations, aggregation, and the markdown report.
//!
//! Four configurations cross RAG on/off with prompt v1/v2 and always appear
//! in the fixed order `norag_v1, norag_v2, rag_v1, rag_v2`. That order also
//! breaks ties when picking the best configuration.
//!
//! Sentinel records (judge failures) are included in the aggregates as zeros
//! and counted separately so the report makes their effect visible.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, TwinError};
use crate::models::{Dimension, EvaluationRecord};
use crate::prompt::PromptVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalConfig {
    pub name: &'static str,
    pub use_rag: bool,
    pub prompt_version: PromptVersion,
}

const STANDARD_CONFIGS: [EvalConfig; 4] = [
    EvalConfig {
        name: "norag_v1",
        use_rag: false,
        prompt_version: PromptVersion::V1,
    },
    EvalConfig {
        name: "norag_v2",
        use_rag: false,
        prompt_version: PromptVersion::V2,
    },
    EvalConfig {
        name: "rag_v1",
        use_rag: true,
        prompt_version: PromptVersion::V1,
    },
    EvalConfig {
        name: "rag_v2",
        use_rag: true,
        prompt_version: PromptVersion::V2,
    },
];

/// All four configurations in fixed order.
pub fn standard_configs() -> Vec<EvalConfig> {
    STANDARD_CONFIGS.to_vec()
}

/// The named subset, kept in fixed order. An empty list selects everything.
pub fn select_configs(names: &[String]) -> Result<Vec<EvalConfig>> {
    if names.is_empty() {
        return Ok(standard_configs());
    }
    for n in names {
        if !STANDARD_CONFIGS.iter().any(|c| c.name == n) {
            return Err(TwinError::Configuration(format!(
                "unknown evaluation config '{}'; expected one of norag_v1, norag_v2, rag_v1, rag_v2",
                n
            )));
        }
    }
    Ok(STANDARD_CONFIGS
        .iter()
        .filter(|c| names.iter().any(|n| n == c.name))
        .cloned()
        .collect())
}

fn config_rank(name: &str) -> usize {
    STANDARD_CONFIGS
        .iter()
        .position(|c| c.name == name)
        .unwrap_or(STANDARD_CONFIGS.len())
}

/// Mean and sample standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stat {
    pub mean: f64,
    /// Sample (n - 1) standard deviation; `0.0` when fewer than two values.
    pub std: f64,
}

impl Stat {
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Stat::default();
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            0.0
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        };
        Stat { mean, std }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub config_name: String,
    pub n: usize,
    /// Records carrying sentinel scores.
    pub failures: usize,
    /// Indexed like [`Dimension::ALL`].
    pub dimensions: [Stat; 4],
    pub composite: Stat,
}

impl ConfigSummary {
    pub fn dimension(&self, dim: Dimension) -> Stat {
        let idx = Dimension::ALL.iter().position(|d| *d == dim).unwrap_or(0);
        self.dimensions[idx]
    }
}

/// Per-configuration summaries, fixed configurations first in fixed order.
pub fn aggregate(records: &[EvaluationRecord]) -> Vec<ConfigSummary> {
    let mut names: Vec<&str> = Vec::new();
    for r in records {
        if !names.contains(&r.config_name.as_str()) {
            names.push(&r.config_name);
        }
    }
    names.sort_by_key(|n| config_rank(n));

    names
        .into_iter()
        .map(|name| {
            let rows: Vec<&EvaluationRecord> =
                records.iter().filter(|r| r.config_name == name).collect();
            let mut dimensions = [Stat::default(); 4];
            for (i, dim) in Dimension::ALL.iter().enumerate() {
                let vals: Vec<f64> = rows.iter().map(|r| r.scores.get(*dim) as f64).collect();
                dimensions[i] = Stat::of(&vals);
            }
            let composites: Vec<f64> = rows.iter().map(|r| r.composite()).collect();
            ConfigSummary {
                config_name: name.to_string(),
                n: rows.len(),
                failures: rows.iter().filter(|r| r.judge_error.is_some()).count(),
                dimensions,
                composite: Stat::of(&composites),
            }
        })
        .collect()
}

/// Highest mean composite; ties go to the configuration earliest in fixed order.
pub fn best_config(summaries: &[ConfigSummary]) -> Option<&ConfigSummary> {
    best_by(summaries, |s| s.composite.mean)
}

fn best_by<F>(summaries: &[ConfigSummary], key: F) -> Option<&ConfigSummary>
where
    F: Fn(&ConfigSummary) -> f64,
{
    let mut best: Option<&ConfigSummary> = None;
    for s in summaries {
        match best {
            Some(b) if key(s) <= key(b) => {}
            _ => best = Some(s),
        }
    }
    best
}

/// Pairwise comparisons between configurations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Findings {
    pub best_config: Option<String>,
    pub best_composite: Option<f64>,
    /// `rag_v1 - norag_v1`.
    pub rag_effect_v1: Option<f64>,
    /// `rag_v2 - norag_v2`.
    pub rag_effect_v2: Option<f64>,
    /// `norag_v2 - norag_v1`.
    pub prompt_effect_norag: Option<f64>,
    /// `rag_v2 - rag_v1`.
    pub prompt_effect_rag: Option<f64>,
    /// `rag_v2 - norag_v1`, with the relative change in percent when defined.
    pub headline: Option<(f64, Option<f64>)>,
    /// Best configuration name and mean per dimension.
    pub best_per_dimension: Vec<(String, String, f64)>,
}

pub fn findings(summaries: &[ConfigSummary]) -> Findings {
    let mean = |name: &str| {
        summaries
            .iter()
            .find(|s| s.config_name == name)
            .map(|s| s.composite.mean)
    };
    let delta = |a: &str, b: &str| Some(mean(a)? - mean(b)?);

    let best = best_config(summaries);
    let headline = delta("rag_v2", "norag_v1").map(|d| {
        let pct = mean("norag_v1")
            .filter(|base| *base != 0.0)
            .map(|base| d / base * 100.0);
        (d, pct)
    });

    let best_per_dimension = Dimension::ALL
        .iter()
        .filter_map(|dim| {
            best_by(summaries, |s| s.dimension(*dim).mean).map(|s| {
                (
                    dim.label().to_string(),
                    s.config_name.clone(),
                    s.dimension(*dim).mean,
                )
            })
        })
        .collect();

    Findings {
        best_config: best.map(|s| s.config_name.clone()),
        best_composite: best.map(|s| s.composite.mean),
        rag_effect_v1: delta("rag_v1", "norag_v1"),
        rag_effect_v2: delta("rag_v2", "norag_v2"),
        prompt_effect_norag: delta("norag_v2", "norag_v1"),
        prompt_effect_rag: delta("rag_v2", "rag_v1"),
        headline,
        best_per_dimension,
    }
}

fn stat_cell(s: Stat) -> String {
    format!("{:.2}±{:.2}", s.mean, s.std)
}

/// Render the markdown evaluation report.
pub fn render_markdown(records: &[EvaluationRecord], generated_at: DateTime<Utc>) -> String {
    let summaries = aggregate(records);
    let f = findings(&summaries);
    let queries: BTreeSet<usize> = records.iter().map(|r| r.query_index).collect();
    let failures: usize = summaries.iter().map(|s| s.failures).sum();

    let mut out = String::new();
    out.push_str("# Decision Twin RAG - Evaluation Report\n\n");
    let _ = writeln!(out, "**Generated:** {}  ", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "**Queries evaluated:** {}  ", queries.len());
    let _ = writeln!(out, "**Configurations:** {}  ", summaries.len());
    let _ = writeln!(out, "**Scoring failures:** {}", failures);

    out.push_str("\n## Summary Scores (mean ± std, scale 1-5)\n\n");
    out.push_str("| Config | Relevance | Faithfulness | Citation | Actionability | **Composite** | n |\n");
    out.push_str("|--------|-----------|--------------|----------|---------------|---------------|---|\n");
    for s in &summaries {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | **{}** | {} |",
            s.config_name,
            stat_cell(s.dimensions[0]),
            stat_cell(s.dimensions[1]),
            stat_cell(s.dimensions[2]),
            stat_cell(s.dimensions[3]),
            stat_cell(s.composite),
            s.n
        );
    }

    out.push_str("\n## Key Findings\n\n");
    if let (Some(name), Some(score)) = (&f.best_config, f.best_composite) {
        let _ = writeln!(out, "- **Best configuration:** `{}` (composite: {:.2})", name, score);
    }
    if let Some((d, pct)) = f.headline {
        match pct {
            Some(p) => {
                let _ = writeln!(out, "- **RAG v2 vs No-RAG v1:** {:+.2} ({:+.1}%)", d, p);
            }
            None => {
                let _ = writeln!(out, "- **RAG v2 vs No-RAG v1:** {:+.2}", d);
            }
        }
    }
    let deltas = [
        ("RAG effect (v1 prompt)", f.rag_effect_v1),
        ("RAG effect (v2 prompt)", f.rag_effect_v2),
        ("Prompt engineering effect (no RAG)", f.prompt_effect_norag),
        ("Prompt engineering effect (RAG)", f.prompt_effect_rag),
    ];
    for (label, value) in deltas {
        if let Some(v) = value {
            let _ = writeln!(out, "- **{}:** {:+.2} composite points", label, v);
        }
    }
    if failures > 0 {
        let _ = writeln!(
            out,
            "- **Note:** {} response(s) could not be scored and count as zeros in the means above.",
            failures
        );
    }

    out.push_str("\n## Per-Dimension Breakdown\n\n");
    for (label, name, score) in &f.best_per_dimension {
        let _ = writeln!(out, "- **{}:** Best = `{}` ({:.2})", label, name, score);
    }

    out.push_str("\n## Methodology\n\n");
    out.push_str("Each query was run through up to 4 configurations (2x2: RAG/No-RAG x v1/v2 prompt).\n");
    out.push_str("Responses were scored by an LLM-as-judge on a 1-5 scale across 4 dimensions:\n");
    out.push_str("relevance, faithfulness, citation quality, and actionability.\n");
    out.push_str("Composite score = mean of all 4 dimensions. Standard deviations are sample (n-1) deviations.\n");
    out
}
