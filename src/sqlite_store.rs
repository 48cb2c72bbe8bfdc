//! SQLite-backed [`KnowledgeStore`].
//!
//! Rows live in `knowledge_chunks`, keyed by `(collection, id)`. Vectors are
//! stored as little-endian f32 blobs; queries are brute-force cosine distance
//! over every row in the collection, which is plenty for a curated corpus of
//! a few thousand chunks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use decision_twin_core::chunk::content_hash;
use decision_twin_core::embedding::{blob_to_vec, vec_to_blob};
use decision_twin_core::models::{ChunkMetadata, SourceKind};
use decision_twin_core::store::{
    rank_by_distance, Fingerprint, KnowledgeExport, KnowledgeRecord, KnowledgeStore, Neighbor,
};
use decision_twin_core::{Result, TwinError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

/// Per-source row count for `twin stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCount {
    pub source_kind: String,
    pub chunks: i64,
    pub documents: i64,
    /// Unix timestamp of the most recent upsert.
    pub last_updated: i64,
}

fn store_err(e: sqlx::Error) -> TwinError {
    TwinError::Store(e.to_string())
}

fn retrieval_err(e: sqlx::Error) -> TwinError {
    TwinError::Retrieval(format!("knowledge store unavailable: {}", e))
}

impl SqliteStore {
    /// Address `collection` in a database whose schema has been migrated.
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_all(&self) -> std::result::Result<Vec<KnowledgeRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, doc_id, source_kind, reference_uri, text, embedding \
             FROM knowledge_chunks WHERE collection = ? ORDER BY id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn source_counts(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            r#"
            SELECT source_kind, COUNT(*) AS chunks, COUNT(DISTINCT doc_id) AS documents,
                   MAX(updated_at) AS last_updated
            FROM knowledge_chunks
            WHERE collection = ?
            GROUP BY source_kind
            ORDER BY chunks DESC
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|r| SourceCount {
                source_kind: r.get("source_kind"),
                chunks: r.get("chunks"),
                documents: r.get("documents"),
                last_updated: r.get("last_updated"),
            })
            .collect())
    }

    async fn write_records(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        records: &[KnowledgeRecord],
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        for r in records {
            sqlx::query(
                r#"
                INSERT INTO knowledge_chunks
                    (collection, id, doc_id, source_kind, reference_uri, text,
                     content_hash, dims, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    doc_id = excluded.doc_id,
                    source_kind = excluded.source_kind,
                    reference_uri = excluded.reference_uri,
                    text = excluded.text,
                    content_hash = excluded.content_hash,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&r.id)
            .bind(&r.metadata.doc_id)
            .bind(r.metadata.source_kind.as_str())
            .bind(&r.metadata.reference_uri)
            .bind(&r.text)
            .bind(content_hash(&r.text))
            .bind(r.vector.len() as i64)
            .bind(vec_to_blob(&r.vector))
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(store_err)?;
        }
        Ok(())
    }

    /// Dimensionality of stored vectors, if every row agrees.
    pub async fn dims(&self) -> Result<Option<i64>> {
        let dims: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT dims FROM knowledge_chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(match dims.as_slice() {
            [d] => Some(*d),
            _ => None,
        })
    }
}

fn row_to_record(row: &SqliteRow) -> std::result::Result<KnowledgeRecord, sqlx::Error> {
    let kind: String = row.try_get("source_kind")?;
    let source_kind = kind
        .parse::<SourceKind>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(KnowledgeRecord {
        id: row.try_get("id")?,
        vector: blob_to_vec(&blob),
        text: row.try_get("text")?,
        metadata: ChunkMetadata {
            doc_id: row.try_get("doc_id")?,
            source_kind,
            reference_uri: row.try_get("reference_uri")?,
        },
    })
}

fn row_to_fingerprint(row: &SqliteRow) -> std::result::Result<(String, Fingerprint), sqlx::Error> {
    let dims: i64 = row.try_get("dims")?;
    Ok((
        row.try_get("id")?,
        Fingerprint {
            content_hash: row.try_get("content_hash")?,
            dims: dims as usize,
        },
    ))
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn upsert(&self, records: &[KnowledgeRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        self.write_records(&mut tx, records).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let records = self.load_all().await.map_err(retrieval_err)?;
        Ok(rank_by_distance(vector, records, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(retrieval_err)?;
        Ok(n as usize)
    }

    async fn export(&self) -> Result<KnowledgeExport> {
        let records = self.load_all().await.map_err(store_err)?;
        let mut export = KnowledgeExport::default();
        for r in records {
            export.push(r);
        }
        Ok(export)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Delete and rewrite the collection in one transaction.
    async fn replace(&self, records: &[KnowledgeRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM knowledge_chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        self.write_records(&mut tx, records).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn fingerprints(&self) -> Result<HashMap<String, Fingerprint>> {
        let rows = sqlx::query(
            "SELECT id, content_hash, dims FROM knowledge_chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(row_to_fingerprint)
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    fn record(id: &str, kind: SourceKind, vector: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            vector,
            text: format!("text for {}", id),
            metadata: ChunkMetadata {
                doc_id: id.rsplit_once("_c").map(|(d, _)| d).unwrap_or(id).to_string(),
                source_kind: kind,
                reference_uri: format!("ref://{}", id),
            },
        }
    }

    async fn open(dir: &TempDir, collection: &str) -> SqliteStore {
        let pool = db::connect_path(&dir.path().join("twin.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool, collection)
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "kb").await;
        let r = record("web_0_c0", SourceKind::Web, vec![1.0, 0.0]);
        store.upsert(&[r.clone()]).await.unwrap();
        store.upsert(&[r.clone()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let mut changed = r;
        changed.text = "new text".to_string();
        store.upsert(&[changed]).await.unwrap();
        let export = store.export().await.unwrap();
        assert_eq!(export.documents, vec!["new text".to_string()]);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "kb").await;
        store
            .upsert(&[
                record("web_0_c0", SourceKind::Web, vec![1.0, 0.0]),
                record("yt_0_c0", SourceKind::Video, vec![0.0, 1.0]),
                record("other_0_c0", SourceKind::Other, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let hits = store.query(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "yt_0_c0");
        assert_eq!(hits[0].metadata.source_kind, SourceKind::Video);
        assert!(hits[0].distance < 1e-5);
        assert_eq!(hits[1].id, "other_0_c0");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = TempDir::new().unwrap();
        let a = open(&dir, "a").await;
        let b = SqliteStore::new(a.pool().clone(), "b");
        a.upsert(&[record("web_0_c0", SourceKind::Web, vec![1.0])]).await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
        b.clear().await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_source_counts_and_dims() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "kb").await;
        store
            .upsert(&[
                record("web_0_c0", SourceKind::Web, vec![1.0, 0.0, 0.0]),
                record("web_0_c1", SourceKind::Web, vec![0.0, 1.0, 0.0]),
                record("yt_0_c0", SourceKind::Video, vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        let counts = store.source_counts().await.unwrap();
        assert_eq!(counts[0].source_kind, "web");
        assert_eq!((counts[0].chunks, counts[0].documents), (2, 1));
        assert!(counts[0].last_updated > 0);
        assert_eq!(store.dims().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_replace_rewrites_collection() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "kb").await;
        let other = SqliteStore::new(store.pool().clone(), "other");
        other.upsert(&[record("web_9_c0", SourceKind::Web, vec![1.0])]).await.unwrap();
        store
            .upsert(&[
                record("web_0_c0", SourceKind::Web, vec![1.0, 0.0]),
                record("web_0_c1", SourceKind::Web, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        store
            .replace(&[record("yt_0_c0", SourceKind::Video, vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(store.export().await.unwrap().ids, vec!["yt_0_c0".to_string()]);
        assert_eq!(other.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fingerprints_read_stored_hash() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "kb").await;
        store
            .upsert(&[record("web_0_c0", SourceKind::Web, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let fingerprints = store.fingerprints().await.unwrap();
        assert_eq!(fingerprints.len(), 1);
        let fp = &fingerprints["web_0_c0"];
        assert_eq!(fp.content_hash, content_hash("text for web_0_c0"));
        assert_eq!(fp.dims, 3);
    }
}
