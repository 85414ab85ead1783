//! Embedding providers.
//!
//! `OllamaEmbedder` calls a co-located embedding service over HTTP;
//! `FakeEmbedder` produces deterministic vectors offline. Set
//! `index.use_fake_embeddings` (or `APP_USE_FAKE_EMBEDDINGS=1`) to select the
//! fake one for tests and development.

use std::sync::Arc;

use recall_core::config::{is_truthy, IndexSettings};
use recall_core::traits::EmbedProvider;

pub mod fake;
pub mod ollama;

pub use fake::FakeEmbedder;
pub use ollama::OllamaEmbedder;

pub const FAKE_EMBEDDING_DIM: usize = 256;

pub fn get_default_embedder(settings: &IndexSettings) -> anyhow::Result<Arc<dyn EmbedProvider>> {
    let use_fake = settings.use_fake_embeddings
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| is_truthy(&v));
    if use_fake {
        tracing::info!(dim = FAKE_EMBEDDING_DIM, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(FAKE_EMBEDDING_DIM)));
    }
    Ok(Arc::new(OllamaEmbedder::from_settings(settings)?))
}
