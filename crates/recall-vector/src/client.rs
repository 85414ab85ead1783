use std::sync::Arc;

use recall_core::error::EmbedError;
use recall_core::traits::EmbedProvider;

use crate::breaker::CircuitBreaker;
use crate::cache::EmbeddingCache;

/// Provider client with a content-addressed cache and a circuit breaker.
///
/// A cache hit never touches the network. A connection-class failure trips
/// the breaker, after which every call fails fast with
/// [`EmbedError::Disabled`] until [`CircuitBreaker::reset`].
pub struct EmbeddingClient {
    provider: Arc<dyn EmbedProvider>,
    cache: Arc<EmbeddingCache>,
    breaker: CircuitBreaker,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbedProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self { provider, cache, breaker: CircuitBreaker::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.breaker.is_enabled()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn provider_id(&self) -> &str {
        self.provider.embedder_id()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if !self.breaker.is_enabled() {
            return Err(EmbedError::Disabled);
        }
        let key = text.trim();
        if key.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        tracing::debug!(len = key.len(), provider = self.provider.embedder_id(), "generating embedding");
        match self.provider.embed(key).await {
            Ok(vector) if vector.is_empty() => Err(EmbedError::Malformed("provider returned an empty vector".into())),
            Ok(vector) => {
                self.cache.insert(key, vector.clone());
                self.cache.persist_in_background();
                Ok(vector)
            }
            Err(e) => {
                if e.is_connection() {
                    self.breaker.trip(&format!("network error: {e}"));
                } else {
                    tracing::debug!(error = %e, "embedding request failed");
                }
                Err(e)
            }
        }
    }
}
