//! Ingestion pipeline.
//!
//! Fetch sources → chunk → embed (batched, paced, retried) → upsert.
//! Chunk ids are deterministic (`{doc_id}_c{index}`), so re-running the
//! pipeline over the same corpus overwrites rows instead of duplicating them.
//! A chunk whose stored text hash and dimensionality still match is not
//! embedded again.
//!
//! Nothing touches the store until every pending chunk has been embedded;
//! `--reset` swaps the collection in a single [`KnowledgeStore::replace`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use decision_twin_core::chunk::{chunk_document, content_hash};
use decision_twin_core::models::{Chunk, Document};
use decision_twin_core::store::{KnowledgeRecord, KnowledgeStore};
use decision_twin_core::TwinError;
use tracing::info;

use crate::app;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbedderAdapter;
use crate::sources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub documents: usize,
    /// Chunks in the corpus.
    pub chunks: usize,
    /// Chunks sent to the embedding provider and written.
    pub embedded: usize,
    /// Chunks already stored with identical text.
    pub unchanged: usize,
}

/// Chunk every document. Two documents sharing a `doc_id` would collide on
/// chunk ids, so that is rejected before anything is embedded.
pub fn chunk_corpus(docs: &[Document], chunking: &ChunkingConfig) -> Result<Vec<Chunk>, TwinError> {
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    for doc in docs {
        for chunk in chunk_document(doc, chunking.size, chunking.overlap)? {
            if !seen.insert(chunk.chunk_id.clone()) {
                return Err(TwinError::Configuration(format!(
                    "duplicate chunk id {}; document ids must be unique",
                    chunk.chunk_id
                )));
            }
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

/// Chunk, embed and store `docs`. Nothing is written unless every pending
/// chunk was embedded. With `reset` the collection is rebuilt from `docs`
/// alone and every chunk is re-embedded.
pub async fn ingest_documents(
    docs: &[Document],
    chunking: &ChunkingConfig,
    embedder: &EmbedderAdapter,
    store: &dyn KnowledgeStore,
    reset: bool,
) -> Result<IngestSummary, TwinError> {
    let chunks = chunk_corpus(docs, chunking)?;
    info!(documents = docs.len(), chunks = chunks.len(), "chunked corpus");

    let stored = if reset {
        HashMap::new()
    } else {
        store.fingerprints().await?
    };
    let dims = embedder.dims();
    let (unchanged, pending): (Vec<&Chunk>, Vec<&Chunk>) = chunks.iter().partition(|c| {
        stored.get(&c.chunk_id).is_some_and(|fp| {
            dims > 0 && fp.dims == dims && fp.content_hash == content_hash(&c.text)
        })
    });
    if !unchanged.is_empty() {
        info!(unchanged = unchanged.len(), "skipping chunks already embedded");
    }

    let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_many(&texts).await?;

    let records: Vec<KnowledgeRecord> = pending
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| KnowledgeRecord::from_chunk(chunk, vector))
        .collect();
    if reset {
        store.replace(&records).await?;
        info!(stored = records.len(), "rebuilt collection");
    } else {
        store.upsert(&records).await?;
        info!(upserted = records.len(), "stored chunks");
    }

    Ok(IngestSummary {
        documents: docs.len(),
        chunks: chunks.len(),
        embedded: records.len(),
        unchanged: unchanged.len(),
    })
}

/// `twin ingest`: fetch the configured (or overridden) sources and build the knowledge base.
pub async fn run_ingest(config: &Config, reset: bool, sources_file: Option<&Path>) -> Result<()> {
    let source_config = match sources_file {
        Some(path) => sources::load_source_list(path, &config.sources)?,
        None => config.sources.clone(),
    };

    let docs = sources::fetch_all(&source_config).await?;
    let store = app::open_store(config).await?;
    let embedder = app::build_embedder(config)?;

    let summary = ingest_documents(&docs, &config.chunking, &embedder, store.as_ref(), reset)
        .await
        .context("Ingestion failed")?;
    let total = store.count().await?;

    println!("ingest {}", store.collection());
    println!("  documents: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    println!("  chunks embedded: {}", summary.embedded);
    println!("  chunks unchanged: {}", summary.unchanged);
    println!("  embedding model: {}", embedder.model_name());
    println!("  collection size: {}", total);
    println!("ok");

    store.pool().close().await;
    Ok(())
}
