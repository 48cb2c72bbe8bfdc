//! Core data models used throughout Decision Twin.
//!
//! These types represent the documents, chunks, retrieval results, and
//! evaluation records that flow through ingestion, serving, and evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TwinError;

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Web,
    /// Video transcript. Accepts the legacy `"youtube"` label on input.
    #[serde(alias = "youtube")]
    Video,
    Other,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Video => "video",
            SourceKind::Other => "other",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(SourceKind::Web),
            "video" | "youtube" => Ok(SourceKind::Video),
            "other" => Ok(SourceKind::Other),
            other => Err(TwinError::Configuration(format!(
                "unknown source kind: '{}'",
                other
            ))),
        }
    }
}

/// Raw fetched document, owned by the ingestion pipeline until chunked.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub source_kind: SourceKind,
    pub reference_uri: String,
    pub raw_text: String,
}

/// A bounded slice of a document's text, the atomic unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `"{doc_id}_c{index}"`.
    pub chunk_id: String,
    pub doc_id: String,
    pub source_kind: SourceKind,
    pub reference_uri: String,
    pub text: String,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: self.doc_id.clone(),
            source_kind: self.source_kind,
            reference_uri: self.reference_uri.clone(),
        }
    }
}

/// Metadata stored beside each vector in the knowledge store.
///
/// Serialized as `{"doc_id", "source", "ref"}` so bulk exports stay
/// interchangeable with existing `kb_export.json` files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    #[serde(rename = "source")]
    pub source_kind: SourceKind,
    #[serde(rename = "ref")]
    pub reference_uri: String,
}

/// A chunk as returned by [`Retriever::retrieve`](crate::retrieve::Retriever::retrieve).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub chunk_id: String,
    pub source_kind: SourceKind,
    pub reference_uri: String,
    pub text: String,
    /// `1 - cosine_distance`, rounded to 4 decimals.
    pub similarity_score: f64,
}

/// The four judge dimensions, each in `[1, 5]` (or all `0` for a scoring failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DimensionScores {
    pub relevance: u8,
    pub faithfulness: u8,
    pub citation_quality: u8,
    pub actionability: u8,
}

impl DimensionScores {
    /// Zero sentinel recorded when the judge payload could not be parsed.
    pub const SENTINEL: DimensionScores = DimensionScores {
        relevance: 0,
        faithfulness: 0,
        citation_quality: 0,
        actionability: 0,
    };

    /// Mean of the four dimensions.
    pub fn composite(&self) -> f64 {
        self.values().iter().sum::<f64>() / 4.0
    }

    /// Values in [`Dimension::ALL`] order.
    pub fn values(&self) -> [f64; 4] {
        [
            self.relevance as f64,
            self.faithfulness as f64,
            self.citation_quality as f64,
            self.actionability as f64,
        ]
    }

    pub fn get(&self, dim: Dimension) -> u8 {
        match dim {
            Dimension::Relevance => self.relevance,
            Dimension::Faithfulness => self.faithfulness,
            Dimension::CitationQuality => self.citation_quality,
            Dimension::Actionability => self.actionability,
        }
    }
}

/// A judge scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Relevance,
    Faithfulness,
    CitationQuality,
    Actionability,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Relevance,
        Dimension::Faithfulness,
        Dimension::CitationQuality,
        Dimension::Actionability,
    ];

    /// JSON key used by the judge payload.
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Relevance => "relevance",
            Dimension::Faithfulness => "faithfulness",
            Dimension::CitationQuality => "citation_quality",
            Dimension::Actionability => "actionability",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Relevance => "Relevance",
            Dimension::Faithfulness => "Faithfulness",
            Dimension::CitationQuality => "Citation Quality",
            Dimension::Actionability => "Actionability",
        }
    }
}

/// One scored (configuration, query) pair from an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub config_name: String,
    pub query_index: usize,
    pub query: String,
    pub generated_answer: String,
    pub retrieved_chunk_count: usize,
    pub top_similarity: Option<f64>,
    pub scores: DimensionScores,
    pub justification: String,
    /// Set when the judge payload could not be scored; `scores` is the sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_error: Option<String>,
}

impl EvaluationRecord {
    pub fn composite(&self) -> f64 {
        self.scores.composite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_accepts_youtube_alias() {
        let meta: ChunkMetadata =
            serde_json::from_str(r#"{"doc_id":"yt_0","source":"youtube","ref":"https://youtube.com/watch?v=x"}"#)
                .unwrap();
        assert_eq!(meta.source_kind, SourceKind::Video);
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["source"], "video");
        assert_eq!(back["ref"], "https://youtube.com/watch?v=x");
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("web".parse::<SourceKind>().unwrap(), SourceKind::Web);
        assert!("podcast".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_composite_is_mean() {
        let s = DimensionScores {
            relevance: 5,
            faithfulness: 4,
            citation_quality: 3,
            actionability: 4,
        };
        assert!((s.composite() - 4.0).abs() < 1e-9);
        assert_eq!(DimensionScores::SENTINEL.composite(), 0.0);
    }
}
