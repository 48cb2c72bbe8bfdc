//! Sliding-window text chunker.
//!
//! Splits document text into overlapping fixed-size windows measured in
//! characters (never bytes, so multi-byte code points are never split).
//!
//! # Algorithm
//!
//! 1. Start a window at character offset 0.
//! 2. Emit `text[start .. start + size]`, clipped to the text length.
//! 3. Stop once the emitted window reaches the end of the text.
//! 4. Otherwise advance `start` by `size - overlap` and repeat.
//!
//! # Guarantees
//!
//! - Text no longer than `size` yields exactly one chunk equal to the text.
//! - Every non-final chunk has exactly `size` characters.
//! - Chunk `i + 1` starts `size - overlap` characters after chunk `i`.
//! - Dropping the first `overlap` characters of every chunk but the first
//!   and concatenating reconstructs the original text.
//! - Empty text yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use decision_twin_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Result, TwinError};
use crate::models::{Chunk, Document};

/// Validate window parameters. `size - overlap` must be positive.
pub fn validate_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(TwinError::Configuration(
            "chunk size must be > 0".to_string(),
        ));
    }
    if overlap >= size {
        return Err(TwinError::Configuration(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }
    Ok(())
}

/// Split `text` into overlapping windows of `size` characters.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<&str>> {
    validate_window(size, overlap)?;

    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_len {
        let end = (start + size).min(char_len);
        chunks.push(&text[bounds[start]..bounds[end]]);
        if end == char_len {
            break;
        }
        start += step;
    }
    Ok(chunks)
}

/// Chunk a [`Document`] into [`Chunk`]s with ids `"{doc_id}_c{index}"`.
pub fn chunk_document(doc: &Document, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let pieces = chunk_text(&doc.raw_text, size, overlap)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            chunk_id: chunk_id(&doc.doc_id, index),
            doc_id: doc.doc_id.clone(),
            source_kind: doc.source_kind,
            reference_uri: doc.reference_uri.clone(),
            text: text.to_string(),
        })
        .collect())
}

pub fn chunk_id(doc_id: &str, index: usize) -> String {
    format!("{}_c{}", doc_id, index)
}

/// SHA-256 of a chunk's text, stored for staleness detection on re-ingestion.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
