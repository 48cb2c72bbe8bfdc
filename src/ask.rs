//! `twin ask` and `twin retrieve`: one-shot queries from the command line.

use anyhow::Result;
use decision_twin_core::answer::{Answer, AnswerRequest};
use decision_twin_core::models::RetrievedItem;
use decision_twin_core::prompt::PromptVersion;

use crate::app;
use crate::config::Config;

const EXCERPT_CHARS: usize = 160;

/// Ask the twin for a recommendation.
///
/// With `json`, the full [`Answer`] (prompt, retrieved chunks, compliance)
/// is printed as JSON instead of the human-readable layout.
pub async fn run_ask(
    config: &Config,
    query: &str,
    no_rag: bool,
    prompt_version: PromptVersion,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let store = app::open_store(config).await?;
    let embedder = app::build_embedder(config)?;
    let orchestrator = app::build_orchestrator(config, store.clone(), embedder)?;

    let request = AnswerRequest::new(
        query,
        !no_rag,
        prompt_version,
        k.unwrap_or(config.retrieval.top_k),
    );
    let answer = orchestrator.answer(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    store.pool().close().await;
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer_text.trim());
    println!();
    println!(
        "--- {} / {} ---",
        if answer.use_rag { "rag" } else { "norag" },
        answer.prompt_version
    );
    if answer.use_rag {
        println!("Sources ({}):", answer.retrieved.len());
        for item in &answer.retrieved {
            println!(
                "  [{}] {:.4} {} {}",
                item.chunk_id, item.similarity_score, item.source_kind, item.reference_uri
            );
        }
    }

    let c = &answer.compliance;
    if !c.is_clean() {
        println!();
        println!("Warnings:");
        match &c.action {
            None => println!("  no recommended action found"),
            Some(action) if !c.action_in_set => {
                println!("  action outside the permitted set: {}", action)
            }
            Some(_) => {}
        }
        for id in &c.unknown_citations {
            println!("  cited chunk was not retrieved: {}", id);
        }
        if !c.meets_citation_minimum {
            println!("  fewer citations than required ({} found)", c.citations.len());
        }
    }
}

/// Print the top-k chunks for a query without generating an answer.
pub async fn run_retrieve(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let store = app::open_store(config).await?;
    let embedder = app::build_embedder(config)?;
    let orchestrator = app::build_orchestrator(config, store.clone(), embedder)?;

    let items = orchestrator
        .retriever()
        .retrieve(query, k.unwrap_or(config.retrieval.top_k))
        .await?;

    if items.is_empty() {
        println!("No results.");
    }
    for (i, item) in items.iter().enumerate() {
        print_item(i + 1, item);
    }

    store.pool().close().await;
    Ok(())
}

fn print_item(rank: usize, item: &RetrievedItem) {
    println!(
        "{}. [{:.4}] {} / {}",
        rank, item.similarity_score, item.source_kind, item.chunk_id
    );
    println!("    ref: {}", item.reference_uri);
    println!("    excerpt: \"{}\"", excerpt(&item.text, EXCERPT_CHARS));
    println!();
}

/// First `max_chars` characters on one line, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat.to_string(),
    }
}
