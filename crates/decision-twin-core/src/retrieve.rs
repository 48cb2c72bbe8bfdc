//! Similarity retrieval over the knowledge store.
//!
//! [`Retriever::retrieve`] embeds the query (single item, not batched), asks
//! the store for the `k` nearest entries, and projects each hit into a
//! [`RetrievedItem`] with `similarity = 1 - cosine_distance`.
//!
//! An empty store is an error, not an empty result: callers must be able to
//! tell "nothing matched" apart from "nothing was ever ingested".

use std::sync::Arc;

use tracing::debug;

use crate::embedding::QueryEmbedder;
use crate::error::{Result, TwinError};
use crate::models::RetrievedItem;
use crate::store::{KnowledgeStore, Neighbor};

/// Decimal places kept on similarity scores for display.
const SIMILARITY_PRECISION: i32 = 4;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn QueryEmbedder>,
    store: Arc<dyn KnowledgeStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn QueryEmbedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    /// Return up to `k` items, highest similarity first.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<RetrievedItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        if self.store.count().await? == 0 {
            return Err(TwinError::Retrieval(
                "knowledge store is empty; run ingestion first".to_string(),
            ));
        }

        let query_vec = self.embedder.embed_query(query_text).await?;
        let neighbors = self.store.query(&query_vec, k).await?;
        debug!(k, hits = neighbors.len(), "retrieved neighbours");

        Ok(neighbors.into_iter().map(to_item).collect())
    }
}

fn to_item(n: Neighbor) -> RetrievedItem {
    RetrievedItem {
        chunk_id: n.id,
        source_kind: n.metadata.source_kind,
        reference_uri: n.metadata.reference_uri,
        text: n.text,
        similarity_score: round_similarity(1.0 - n.distance as f64),
    }
}

fn round_similarity(value: f64) -> f64 {
    let factor = 10f64.powi(SIMILARITY_PRECISION);
    (value * factor).round() / factor
}
