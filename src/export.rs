//! Bulk export and import of the knowledge base.
//!
//! The JSON document is columnar: `{ids, documents, metadatas, embeddings}`,
//! one entry per chunk at the same index in every column. An export from one
//! collection can be imported into another (or another machine) without
//! re-embedding.

use std::path::Path;

use anyhow::{Context, Result};
use decision_twin_core::store::{KnowledgeExport, KnowledgeStore};

use crate::app;
use crate::config::Config;

/// Serialize every entry of `store` as pretty JSON.
pub async fn export_json(store: &dyn KnowledgeStore) -> Result<(String, usize)> {
    let export = store.export().await?;
    let n = export.len();
    Ok((serde_json::to_string_pretty(&export)?, n))
}

/// Parse an export document and upsert its entries. Returns the number imported.
pub async fn import_json(store: &dyn KnowledgeStore, json: &str) -> Result<usize> {
    let export: KnowledgeExport =
        serde_json::from_str(json).context("Failed to parse knowledge export")?;
    let records = export.into_records()?;
    store.upsert(&records).await?;
    Ok(records.len())
}

/// `twin export`. Writes to `output` if given, otherwise to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = app::open_store(config).await?;
    let (json, n) = export_json(store.as_ref()).await?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} chunks to {}", n, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    store.pool().close().await;
    Ok(())
}

/// `twin import FILE`.
pub async fn run_import(config: &Config, input: &Path) -> Result<()> {
    let json = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read export file: {}", input.display()))?;
    let store = app::open_store(config).await?;
    let n = import_json(store.as_ref(), &json).await?;
    let total = store.count().await?;
    eprintln!(
        "Imported {} chunks into {} ({} total)",
        n,
        store.collection(),
        total
    );
    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use decision_twin_core::models::{ChunkMetadata, SourceKind};
    use decision_twin_core::store::memory::InMemoryStore;
    use decision_twin_core::store::KnowledgeRecord;

    fn record(id: &str, vector: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            vector,
            text: format!("text {}", id),
            metadata: ChunkMetadata {
                doc_id: "yt_0".to_string(),
                source_kind: SourceKind::Video,
                reference_uri: "https://youtube.com/watch?v=abc".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_export_then_import_preserves_entries() {
        let source = InMemoryStore::new();
        source
            .upsert(&[record("yt_0_c0", vec![1.0, 0.0]), record("yt_0_c1", vec![0.0, 1.0])])
            .await
            .unwrap();
        let (json, n) = export_json(&source).await.unwrap();
        assert_eq!(n, 2);
        assert!(json.contains("\"source\": \"video\""));

        let target = InMemoryStore::new();
        assert_eq!(import_json(&target, &json).await.unwrap(), 2);
        assert_eq!(target.count().await.unwrap(), 2);
        let hits = target.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "yt_0_c1");
    }

    #[tokio::test]
    async fn test_import_rejects_ragged_columns() {
        let json = r#"{"ids": ["a", "b"], "documents": ["x"], "metadatas": [], "embeddings": []}"#;
        assert!(import_json(&InMemoryStore::new(), json).await.is_err());
    }
}
