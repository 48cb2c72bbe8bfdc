//! Error taxonomy shared by every Decision Twin component.
//!
//! Capability implementations (embedding, generation) report a
//! [`ProviderError`], which the application's retry policy inspects to decide
//! whether another attempt is worthwhile. Everything above the capability
//! boundary speaks [`TwinError`].

use thiserror::Error;

/// Failure reported by an external embedding or generation capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Rate limiting, 5xx responses, or a network fault. Worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Client errors, authentication failures, malformed responses.
    #[error("provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Returns true if another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify an HTTP status code the way every provider does:
    /// 429 and 5xx are transient, everything else is permanent.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status == 429 || (500..600).contains(&status) {
            ProviderError::Transient(message)
        } else {
            ProviderError::Permanent(message)
        }
    }
}

#[derive(Error, Debug)]
pub enum TwinError {
    /// Invalid chunking parameters, spec fields, or provider settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding failed fatally (retries exhausted or a permanent error).
    #[error("embedding failed after {attempts} attempt(s): {cause}")]
    Embedding {
        attempts: u32,
        #[source]
        cause: ProviderError,
    },

    /// Generation failed fatally (retries exhausted or a permanent error).
    #[error("generation failed after {attempts} attempt(s): {cause}")]
    Generation {
        attempts: u32,
        #[source]
        cause: ProviderError,
    },

    /// The knowledge store is empty, unreachable, or the collection is missing.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// The judge returned a payload that could not be scored.
    #[error("judge scoring error: {0}")]
    JudgeScoring(String),

    /// A single ingestion source could not be fetched.
    #[error("failed to fetch {reference}: {reason}")]
    SourceFetch { reference: String, reason: String },

    /// Ingestion produced no documents at all.
    #[error("no documents fetched; check source URLs and network")]
    NoDocuments,

    /// Write, export, or import failure in the knowledge store.
    #[error("knowledge store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, TwinError>;
