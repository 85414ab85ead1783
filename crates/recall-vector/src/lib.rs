//! recall-vector
//!
//! The embedding side of the index: a caching, breaker-guarded client in
//! front of an [`EmbedProvider`](recall_core::traits::EmbedProvider), plus
//! the cosine similarity used for ranking.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod similarity;

pub use breaker::CircuitBreaker;
pub use cache::{EmbeddingCache, EMBEDDING_CACHE_KEY};
pub use client::EmbeddingClient;
pub use similarity::cosine_similarity;
