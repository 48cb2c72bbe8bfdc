//! In-memory [`KnowledgeStore`] implementation for tests and embedding.
//!
//! Uses a `BTreeMap` keyed by chunk id behind `std::sync::RwLock`. Queries
//! are brute-force cosine distance over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, TwinError};

use super::{rank_by_distance, KnowledgeExport, KnowledgeRecord, KnowledgeStore, Neighbor};

/// In-memory knowledge store.
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, KnowledgeRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> TwinError {
    TwinError::Store("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn upsert(&self, records: &[KnowledgeRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        for r in records {
            stored.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let stored = self
            .records
            .read()
            .map_err(|_| TwinError::Retrieval("in-memory store lock poisoned".to_string()))?;
        Ok(rank_by_distance(vector, stored.values().cloned(), k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    async fn export(&self) -> Result<KnowledgeExport> {
        let stored = self.records.read().map_err(poisoned)?;
        let mut export = KnowledgeExport::default();
        for r in stored.values() {
            export.push(r.clone());
        }
        Ok(export)
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn replace(&self, records: &[KnowledgeRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        *stored = records.iter().map(|r| (r.id.clone(), r.clone())).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, SourceKind};

    fn record(id: &str, vector: Vec<f32>, text: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            vector,
            text: text.to_string(),
            metadata: ChunkMetadata {
                doc_id: id.split("_c").next().unwrap_or(id).to_string(),
                source_kind: SourceKind::Web,
                reference_uri: format!("https://example.com/{}", id),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let r = record("web_0_c0", vec![1.0, 0.0], "onboarding emails");
        store.upsert(&[r.clone()]).await.unwrap();
        store.upsert(&[r.clone()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let mut changed = r.clone();
        changed.text = "updated".to_string();
        store.upsert(&[changed]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let export = store.export().await.unwrap();
        assert_eq!(export.documents, vec!["updated".to_string()]);
    }

    #[tokio::test]
    async fn test_query_ascending_distance() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                record("web_0_c0", vec![1.0, 0.0], "a"),
                record("web_0_c1", vec![0.7, 0.7], "b"),
                record("web_0_c2", vec![-1.0, 0.0], "c"),
            ])
            .await
            .unwrap();
        let hits = store.query(&[1.0, 0.1], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "web_0_c0");
        assert_eq!(hits[2].id, "web_0_c2");
        for w in hits.windows(2) {
            assert!(w[0].distance <= w[1].distance);
        }
        assert!(hits.iter().all(|h| (0.0..=2.0).contains(&h.distance)));
    }

    #[tokio::test]
    async fn test_query_exact_vector_is_top_hit() {
        let store = InMemoryStore::new();
        let target = vec![0.3, -0.2, 0.9, 0.1];
        store
            .upsert(&[
                record("web_0_c0", vec![0.9, 0.1, 0.0, 0.0], "x"),
                record("yt_1_c4", target.clone(), "target"),
                record("web_2_c0", vec![0.0, 0.0, 0.1, 0.9], "y"),
            ])
            .await
            .unwrap();
        let hits = store.query(&target, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "yt_1_c4");
        assert!(hits[0].distance.abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_export_then_clear() {
        let store = InMemoryStore::new();
        store
            .upsert(&[record("a_c0", vec![1.0], "a"), record("a_c1", vec![0.5], "b")])
            .await
            .unwrap();
        let export = store.export().await.unwrap();
        assert_eq!(export.len(), 2);
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store.upsert(&export.into_records().unwrap()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_swaps_collection() {
        let store = InMemoryStore::new();
        store
            .upsert(&[record("old_c0", vec![1.0], "old"), record("old_c1", vec![0.5], "old")])
            .await
            .unwrap();
        store.replace(&[record("new_c0", vec![0.2, 0.4], "new")]).await.unwrap();
        let export = store.export().await.unwrap();
        assert_eq!(export.ids, vec!["new_c0".to_string()]);
    }

    #[tokio::test]
    async fn test_fingerprints_hash_stored_text() {
        let store = InMemoryStore::new();
        store
            .upsert(&[record("web_0_c0", vec![1.0, 0.0, 0.0], "win-back emails")])
            .await
            .unwrap();
        let fingerprints = store.fingerprints().await.unwrap();
        let fp = &fingerprints["web_0_c0"];
        assert_eq!(fp.content_hash, crate::chunk::content_hash("win-back emails"));
        assert_eq!(fp.dims, 3);
    }
}
