//! Wiring from [`Config`] to the runtime components.
//!
//! Every command builds what it needs from here so providers, retry
//! policies and the store are constructed the same way for the CLI, the
//! evaluator and the HTTP server.

use std::sync::Arc;

use anyhow::Result;
use decision_twin_core::answer::Orchestrator;
use decision_twin_core::judge::Judge;
use decision_twin_core::retrieve::Retriever;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbedderAdapter};
use crate::generation::{create_generator, GeneratorAdapter};
use crate::migrate;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteStore;

/// Open the database, make sure the schema exists, and address the configured collection.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool, config.db.collection.clone())))
}

pub fn build_embedder(config: &Config) -> Result<Arc<EmbedderAdapter>> {
    let provider = create_provider(&config.embedding)?;
    Ok(Arc::new(EmbedderAdapter::from_config(provider, &config.embedding)))
}

pub fn build_generator(config: &Config) -> Result<Arc<GeneratorAdapter>> {
    let provider = create_generator(&config.generation, None)?;
    Ok(Arc::new(GeneratorAdapter::from_config(provider, &config.generation)))
}

/// The judge shares the generation provider settings but may use its own
/// model and retry cap.
pub fn build_judge(config: &Config) -> Result<Judge> {
    let provider = create_generator(&config.generation, config.judge_model())?;
    let retry = RetryPolicy::new(
        config.judge.max_retries,
        config.generation.initial_backoff_ms,
        config.generation.max_backoff_ms,
    );
    Ok(Judge::new(Arc::new(GeneratorAdapter::new(provider, retry)))
        .with_parse_attempts(config.judge.parse_attempts))
}

pub fn build_orchestrator(
    config: &Config,
    store: Arc<SqliteStore>,
    embedder: Arc<EmbedderAdapter>,
) -> Result<Orchestrator> {
    let retriever = Retriever::new(embedder, store);
    Ok(Orchestrator::new(
        retriever,
        build_generator(config)?,
        Arc::new(config.twin.clone()),
    ))
}
