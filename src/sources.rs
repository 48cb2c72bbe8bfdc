//! Source corpus fetching.
//!
//! Three kinds of source feed the knowledge base:
//!
//! | Kind | Config | `doc_id` | Reference |
//! |------|--------|----------|-----------|
//! | web | `sources.web_urls` | `web_{i}` | the URL |
//! | video | `sources.video_ids` | `yt_{j}` | `https://youtube.com/watch?v={id}` |
//! | other | `[sources.local]` globs | `other_{k}` | `file://{path}` |
//!
//! A source that cannot be fetched is logged and skipped. Fetching nothing
//! at all is [`TwinError::NoDocuments`].

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use decision_twin_core::models::{Document, SourceKind};
use decision_twin_core::TwinError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{LocalSourceConfig, SourcesConfig};
use crate::extract::{clean_text, html_to_text, transcript_to_text};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; decision-twin)";
const FETCH_TIMEOUT_SECS: u64 = 30;
const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

/// A standalone source list file (`twin ingest --sources FILE`).
///
/// Accepts the keys `web_urls` and `video_ids` (or `youtube_video_ids`).
#[derive(Debug, Deserialize, Default)]
pub struct SourceListFile {
    #[serde(default)]
    pub web_urls: Vec<String>,
    #[serde(default, alias = "youtube_video_ids")]
    pub video_ids: Vec<String>,
}

/// Read a JSON source list, replacing the configured URLs and video ids.
pub fn load_source_list(path: &Path, base: &SourcesConfig) -> Result<SourcesConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source list: {}", path.display()))?;
    let list: SourceListFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse source list: {}", path.display()))?;
    Ok(SourcesConfig {
        web_urls: list.web_urls,
        video_ids: list.video_ids,
        local: base.local.clone(),
    })
}

fn fetch_error(reference: &str, reason: impl ToString) -> TwinError {
    TwinError::SourceFetch {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}

pub fn video_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={}", video_id)
}

/// Fetch every configured source, skipping the ones that fail.
pub async fn fetch_all(sources: &SourcesConfig) -> Result<Vec<Document>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;

    let mut docs = Vec::new();

    for (i, url) in sources.web_urls.iter().enumerate() {
        match fetch_web_text(&client, url).await {
            Ok(text) => {
                info!(doc_id = %format!("web_{}", i), url = %url, chars = text.chars().count(), "fetched web page");
                docs.push(Document {
                    doc_id: format!("web_{}", i),
                    source_kind: SourceKind::Web,
                    reference_uri: url.clone(),
                    raw_text: text,
                });
            }
            Err(e) => warn!(doc_id = %format!("web_{}", i), error = %e, "skipping web source"),
        }
    }

    for (j, vid) in sources.video_ids.iter().enumerate() {
        match fetch_transcript(&client, vid).await {
            Ok(text) => {
                info!(doc_id = %format!("yt_{}", j), video = %vid, chars = text.chars().count(), "fetched transcript");
                docs.push(Document {
                    doc_id: format!("yt_{}", j),
                    source_kind: SourceKind::Video,
                    reference_uri: video_url(vid),
                    raw_text: text,
                });
            }
            Err(e) => warn!(doc_id = %format!("yt_{}", j), error = %e, "skipping video source"),
        }
    }

    if let Some(local) = &sources.local {
        match scan_local(local) {
            Ok(found) => docs.extend(found),
            Err(e) => warn!(root = %local.root.display(), error = %e, "skipping local sources"),
        }
    }

    if docs.is_empty() {
        return Err(TwinError::NoDocuments.into());
    }
    Ok(docs)
}

async fn fetch_web_text(client: &reqwest::Client, url: &str) -> std::result::Result<String, TwinError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_error(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(url, format!("HTTP {}", status)));
    }
    let html = response.text().await.map_err(|e| fetch_error(url, e))?;
    let text = html_to_text(&html).map_err(|e| fetch_error(url, e))?;
    if text.is_empty() {
        return Err(fetch_error(url, "page has no readable text"));
    }
    Ok(text)
}

async fn fetch_transcript(client: &reqwest::Client, video_id: &str) -> std::result::Result<String, TwinError> {
    let reference = video_url(video_id);
    let response = client
        .get(TIMEDTEXT_URL)
        .query(&[("lang", "en"), ("v", video_id)])
        .send()
        .await
        .map_err(|e| fetch_error(&reference, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(&reference, format!("HTTP {}", status)));
    }
    let xml = response.text().await.map_err(|e| fetch_error(&reference, e))?;
    if xml.trim().is_empty() {
        return Err(fetch_error(&reference, "no transcript available"));
    }
    let text = transcript_to_text(&xml).map_err(|e| fetch_error(&reference, e))?;
    if text.is_empty() {
        return Err(fetch_error(&reference, "transcript is empty"));
    }
    Ok(text)
}

/// Walk `[sources.local]` and read every matching text file as an `other` document.
pub fn scan_local(local: &LocalSourceConfig) -> Result<Vec<Document>> {
    let root = &local.root;
    if !root.exists() {
        anyhow::bail!("local source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&local.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(local.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(local.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push((rel_str, path.to_path_buf()));
    }

    // Sorted so doc ids are stable across runs.
    paths.sort();

    let mut docs = Vec::new();
    for (rel, path) in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(body) => clean_text(&body),
            Err(e) => {
                warn!(path = %rel, error = %e, "skipping unreadable file");
                continue;
            }
        };
        if text.is_empty() {
            continue;
        }
        let doc_id = format!("other_{}", docs.len());
        info!(doc_id = %doc_id, path = %rel, chars = text.chars().count(), "read local file");
        docs.push(Document {
            doc_id,
            source_kind: SourceKind::Other,
            reference_uri: format!("file://{}", path.display()),
            raw_text: text,
        });
    }
    Ok(docs)
}

/// Print the configured sources without fetching anything.
pub fn list_sources(sources: &SourcesConfig) {
    println!("{:<8} {:<6} REFERENCE", "KIND", "DOC");
    for (i, url) in sources.web_urls.iter().enumerate() {
        println!("{:<8} {:<6} {}", "web", format!("web_{}", i), url);
    }
    for (j, vid) in sources.video_ids.iter().enumerate() {
        println!("{:<8} {:<6} {}", "video", format!("yt_{}", j), video_url(vid));
    }
    match &sources.local {
        Some(local) => println!(
            "{:<8} {:<6} {} ({})",
            "other",
            "-",
            local.root.display(),
            local.include_globs.join(", ")
        ),
        None => println!("{:<8} {:<6} NOT CONFIGURED", "other", "-"),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
