use async_trait::async_trait;

use crate::error::EmbedError;

/// A source of text embeddings.
///
/// Implementations perform exactly one provider round-trip per call; caching
/// and failure latching are layered on top by the caller.
#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `ollama:qwen3-embedding:0.6b`).
    fn embedder_id(&self) -> &str;

    /// Compute the embedding of a single, already-trimmed, non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}
