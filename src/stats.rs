//! Knowledge base statistics.
//!
//! Summarises what `twin ingest` produced: chunk and document counts per
//! source kind, vector dimensionality, and when each source was last
//! refreshed. Used by `twin stats` to sanity-check a collection before
//! asking questions or running an evaluation.

use anyhow::Result;
use decision_twin_core::store::KnowledgeStore;

use crate::app;
use crate::config::Config;

/// Run the stats command: query the collection and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = app::open_store(config).await?;

    let total = store.count().await?;
    let per_source = store.source_counts().await?;
    let dims = store.dims().await?;
    let documents: i64 = per_source.iter().map(|s| s.documents).sum();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Decision Twin: Knowledge Base Stats");
    println!("====================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", store.collection());
    println!();
    println!("  Documents:   {}", documents);
    println!("  Chunks:      {}", total);
    println!(
        "  Dimensions:  {}",
        match dims {
            Some(d) => d.to_string(),
            None if total == 0 => "-".to_string(),
            None => "mixed".to_string(),
        }
    );

    if !per_source.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<10} {:>6} {:>8}   {}",
            "SOURCE", "DOCS", "CHUNKS", "LAST UPDATED"
        );
        println!("  {}", "-".repeat(48));

        for s in &per_source {
            println!(
                "  {:<10} {:>6} {:>8}   {}",
                s.source_kind,
                s.documents,
                s.chunks,
                format_ts_relative(s.last_updated)
            );
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now, e.g. "3 hours ago".
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        plural(delta / 60, "min")
    } else if delta < 86400 {
        plural(delta / 3600, "hour")
    } else if delta < 86400 * 30 {
        plural(delta / 86400, "day")
    } else {
        format_ts_iso(ts)
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
