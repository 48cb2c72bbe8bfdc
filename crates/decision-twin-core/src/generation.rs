//! Text generation capability traits.
//!
//! [`GenerationProvider`] is the raw external capability; [`TextGenerator`]
//! is the retried, fatal-on-exhaustion interface the orchestrator and the
//! evaluator call. The application's `GeneratorAdapter` bridges the two.

use async_trait::async_trait;

use crate::error::{ProviderError, Result};

/// An external text generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}

/// Generates a response or fails with [`TwinError::Generation`](crate::TwinError::Generation).
///
/// Implementations must hold no mutable state shared between calls, so
/// independent queries can be answered concurrently.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
