//! Knowledge store abstraction.
//!
//! The [`KnowledgeStore`] trait is the narrow interface the core needs from a
//! vector index: idempotent upsert by chunk id, k-nearest-neighbour query by
//! cosine distance, and a columnar bulk export for moving a collection
//! between store instances.
//!
//! Implementations must be `Send + Sync`; reads may be shared freely across
//! concurrent callers, writes come from a single ingestion writer.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::content_hash;
use crate::error::{Result, TwinError};
use crate::models::{Chunk, ChunkMetadata};

/// One entry to upsert: a chunk's id, vector, text, and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl KnowledgeRecord {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: chunk.metadata(),
        }
    }
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance in `[0, 2]`.
    pub distance: f32,
}

/// What is already stored under a chunk id, used to skip re-embedding text
/// that has not changed since the last ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// [`content_hash`] of the stored text.
    pub content_hash: String,
    pub dims: usize,
}

/// Columnar bulk export: `{ids, documents, metadatas, embeddings}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeExport {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub embeddings: Vec<Vec<f32>>,
}

impl KnowledgeExport {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, record: KnowledgeRecord) {
        self.ids.push(record.id);
        self.documents.push(record.text);
        self.metadatas.push(record.metadata);
        self.embeddings.push(record.vector);
    }

    /// Convert back into records, rejecting exports whose columns disagree in length.
    pub fn into_records(self) -> Result<Vec<KnowledgeRecord>> {
        let n = self.ids.len();
        if self.documents.len() != n || self.metadatas.len() != n || self.embeddings.len() != n {
            return Err(TwinError::Store(format!(
                "malformed export: {} ids, {} documents, {} metadatas, {} embeddings",
                n,
                self.documents.len(),
                self.metadatas.len(),
                self.embeddings.len()
            )));
        }
        Ok(self
            .ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .zip(self.embeddings)
            .map(|(((id, text), metadata), vector)| KnowledgeRecord {
                id,
                vector,
                text,
                metadata,
            })
            .collect())
    }
}

/// Abstract vector index holding chunk embeddings, text, and metadata.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](KnowledgeStore::upsert) | Insert or overwrite entries by id |
/// | [`query`](KnowledgeStore::query) | k nearest entries, ascending cosine distance |
/// | [`count`](KnowledgeStore::count) | Number of stored entries |
/// | [`export`](KnowledgeStore::export) | Columnar dump of every entry |
/// | [`clear`](KnowledgeStore::clear) | Remove every entry |
/// | [`replace`](KnowledgeStore::replace) | Swap the whole collection for a new set of entries |
/// | [`fingerprints`](KnowledgeStore::fingerprints) | Content hash and dimensionality per stored id |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert or overwrite entries. Re-upserting an existing id never duplicates it.
    async fn upsert(&self, records: &[KnowledgeRecord]) -> Result<()>;

    /// Return up to `k` entries nearest to `vector`, ascending by distance.
    ///
    /// An unreachable store or missing collection is a
    /// [`TwinError::Retrieval`].
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    async fn count(&self) -> Result<usize>;

    async fn export(&self) -> Result<KnowledgeExport>;

    async fn clear(&self) -> Result<()>;

    /// Remove every entry and store `records` in their place.
    ///
    /// The default clears then upserts; stores with transactions should
    /// override it so a failed write leaves the previous contents intact.
    async fn replace(&self, records: &[KnowledgeRecord]) -> Result<()> {
        self.clear().await?;
        self.upsert(records).await
    }

    async fn fingerprints(&self) -> Result<HashMap<String, Fingerprint>> {
        let export = self.export().await?;
        Ok(export
            .into_records()?
            .into_iter()
            .map(|r| {
                let fingerprint = Fingerprint {
                    content_hash: content_hash(&r.text),
                    dims: r.vector.len(),
                };
                (r.id, fingerprint)
            })
            .collect())
    }
}

/// Sort neighbours ascending by distance, breaking ties by id.
fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Rank stored records against a query vector by cosine distance.
///
/// Shared by the in-memory store and brute-force backends in the app crate.
pub fn rank_by_distance<I>(query: &[f32], candidates: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = KnowledgeRecord>,
{
    let mut neighbors: Vec<Neighbor> = candidates
        .into_iter()
        .map(|record| Neighbor {
            distance: crate::embedding::cosine_distance(query, &record.vector),
            id: record.id,
            text: record.text,
            metadata: record.metadata,
        })
        .collect();
    sort_neighbors(&mut neighbors);
    neighbors.truncate(k);
    neighbors
}
