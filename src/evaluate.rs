//! Evaluation runs: every selected configuration answers every query, the
//! judge scores each answer, and the results feed the markdown report.
//!
//! A run is persisted as an [`EvaluationRun`] JSON file so the report can be
//! regenerated later with `twin evaluate --report-only`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use decision_twin_core::answer::{AnswerRequest, Orchestrator};
use decision_twin_core::judge::Judge;
use decision_twin_core::models::EvaluationRecord;
use decision_twin_core::report::{render_markdown, select_configs, EvalConfig};
use decision_twin_core::TwinError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app;
use crate::config::Config;

/// A persisted evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub generation_model: String,
    pub judge_model: String,
    pub top_k: usize,
    pub configs: Vec<String>,
    pub records: Vec<EvaluationRecord>,
    /// Why the run stopped early; the records are those scored before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

/// A run stopped by a retrieval or generation failure.
#[derive(Debug, Error)]
#[error("evaluation aborted after {} records: {source}", .records.len())]
pub struct EvaluationAborted {
    /// Records completed before the failure, in run order.
    pub records: Vec<EvaluationRecord>,
    #[source]
    pub source: TwinError,
}

/// Drives (configuration, query) pairs through the orchestrator and the judge.
pub struct Evaluator {
    orchestrator: Orchestrator,
    judge: Judge,
    top_k: usize,
    pacing: Duration,
}

impl Evaluator {
    pub fn new(orchestrator: Orchestrator, judge: Judge, top_k: usize, pacing: Duration) -> Self {
        Self {
            orchestrator,
            judge,
            top_k,
            pacing,
        }
    }

    /// Run every configuration over every query, in order.
    ///
    /// Judge failures are recorded as sentinel scores and the run continues;
    /// retrieval and generation failures abort the run, handing back the
    /// records scored so far.
    pub async fn run(
        &self,
        configs: &[EvalConfig],
        queries: &[String],
    ) -> Result<Vec<EvaluationRecord>, EvaluationAborted> {
        let mut records = Vec::with_capacity(configs.len() * queries.len());
        let mut first_call = true;

        for config in configs {
            info!(config = config.name, queries = queries.len(), "evaluating configuration");
            for (query_index, query) in queries.iter().enumerate() {
                self.pace(&mut first_call).await;
                let request = AnswerRequest::new(
                    query.clone(),
                    config.use_rag,
                    config.prompt_version,
                    self.top_k,
                );
                let answer = match self.orchestrator.answer(&request).await {
                    Ok(answer) => answer,
                    Err(source) => return Err(EvaluationAborted { records, source }),
                };

                self.pace(&mut first_call).await;
                let verdict = self
                    .judge
                    .score(query, &answer.answer_text, &answer.retrieved)
                    .await;

                info!(
                    config = config.name,
                    query = query_index + 1,
                    composite = verdict.scores.composite(),
                    failed = verdict.is_sentinel(),
                    "scored answer"
                );

                records.push(EvaluationRecord {
                    config_name: config.name.to_string(),
                    query_index,
                    query: query.clone(),
                    generated_answer: answer.answer_text,
                    retrieved_chunk_count: answer.retrieved.len(),
                    top_similarity: answer.retrieved.first().map(|r| r.similarity_score),
                    scores: verdict.scores,
                    justification: verdict.justification,
                    judge_error: verdict.error,
                });
            }
        }
        Ok(records)
    }

    async fn pace(&self, first_call: &mut bool) {
        if *first_call {
            *first_call = false;
            return;
        }
        if !self.pacing.is_zero() {
            debug!(pacing = ?self.pacing, "pacing before next generation call");
            tokio::time::sleep(self.pacing).await;
        }
    }
}

pub fn write_run(path: &Path, run: &EvaluationRun) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(run)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results: {}", path.display()))?;
    Ok(())
}

pub fn read_run(path: &Path) -> Result<EvaluationRun> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse results: {}", path.display()))
}

fn write_report(path: &Path, records: &[EvaluationRecord], generated_at: DateTime<Utc>) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, render_markdown(records, generated_at))
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// `twin evaluate`.
pub async fn run_evaluate(
    config: &Config,
    config_names: &[String],
    report_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    let results_path = &config.evaluation.results_path;
    let report_path = &config.evaluation.report_path;

    if report_only {
        let run = read_run(results_path)?;
        write_report(report_path, &run.records, Utc::now())?;
        println!("evaluate (report only)");
        println!("  run: {}", run.run_id);
        println!("  records: {}", run.records.len());
        if let Some(reason) = &run.aborted {
            println!("  partial run, aborted: {}", reason);
        }
        println!("  report: {}", report_path.display());
        return Ok(());
    }

    let configs = select_configs(config_names)?;
    let mut queries = config.evaluation.queries.clone();
    if let Some(n) = limit {
        queries.truncate(n);
    }

    let store = app::open_store(config).await?;
    let embedder = app::build_embedder(config)?;
    let orchestrator = app::build_orchestrator(config, store.clone(), embedder)?;
    let judge = app::build_judge(config)?;
    let evaluator = Evaluator::new(
        orchestrator,
        judge,
        config.retrieval.top_k,
        Duration::from_millis(config.evaluation.pacing_ms),
    );

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    info!(run_id = %run_id, configs = configs.len(), queries = queries.len(), "starting evaluation");

    let outcome = evaluator.run(&configs, &queries).await;
    let finished_at = Utc::now();
    let mut run = EvaluationRun {
        run_id,
        started_at,
        finished_at,
        generation_model: config.generation.model.clone().unwrap_or_default(),
        judge_model: config.judge_model().unwrap_or_default().to_string(),
        top_k: config.retrieval.top_k,
        configs: configs.iter().map(|c| c.name.to_string()).collect(),
        records: Vec::new(),
        aborted: None,
    };

    match outcome {
        Ok(records) => run.records = records,
        Err(aborted) => {
            run.records = aborted.records;
            run.aborted = Some(aborted.source.to_string());
            write_run(results_path, &run)?;
            warn!(
                records = run.records.len(),
                results = %results_path.display(),
                "evaluation aborted, partial results saved"
            );
            store.pool().close().await;
            return Err(anyhow::Error::new(aborted.source).context(format!(
                "Evaluation aborted after {} records; partial results written to {}",
                run.records.len(),
                results_path.display()
            )));
        }
    }
    let failures = run.records.iter().filter(|r| r.judge_error.is_some()).count();
    write_run(results_path, &run)?;
    write_report(report_path, &run.records, finished_at)?;

    println!("evaluate {}", run.run_id);
    println!("  configurations: {}", run.configs.join(", "));
    println!("  queries: {}", queries.len());
    println!("  records: {}", run.records.len());
    println!("  scoring failures: {}", failures);
    println!("  results: {}", results_path.display());
    println!("  report: {}", report_path.display());

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use decision_twin_core::report::standard_configs;
    use tempfile::TempDir;

    #[test]
    fn test_run_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/eval_results.json");
        let run = EvaluationRun {
            run_id: "run-1".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            generation_model: "gemini-2.0-flash".to_string(),
            judge_model: "gemini-2.0-flash".to_string(),
            top_k: 5,
            configs: standard_configs().iter().map(|c| c.name.to_string()).collect(),
            records: Vec::new(),
            aborted: None,
        };
        write_run(&path, &run).unwrap();
        let back = read_run(&path).unwrap();
        assert_eq!(back.run_id, "run-1");
        assert_eq!(back.configs, vec!["norag_v1", "norag_v2", "rag_v1", "rag_v2"]);
        assert!(back.aborted.is_none());
        assert!(!std::fs::read_to_string(&path).unwrap().contains("aborted"));
    }

    #[test]
    fn test_read_missing_run_fails() {
        let dir = TempDir::new().unwrap();
        assert!(read_run(&dir.path().join("missing.json")).is_err());
    }
}
