use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per chunk per collection; re-ingesting overwrites by id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            reference_uri TEXT NOT NULL,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_doc ON knowledge_chunks(collection, doc_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_source ON knowledge_chunks(collection, source_kind)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
