//! recall-hybrid
//!
//! The in-process hybrid retrieval index. [`HybridIndex`] owns the entry
//! store, the embedding client and the persistence worker; producers call
//! [`HybridIndex::index`] and consumers call [`HybridIndex::search`] or the
//! lookup methods. Provider and disk failures degrade results, they are
//! never returned from those calls.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;

use recall_core::blob_store::BlobStore;
use recall_core::config::IndexSettings;
use recall_core::error::{EmbedError, Error, Result};
use recall_core::traits::EmbedProvider;
use recall_core::types::{IndexEntry, Meta};
use recall_vector::{EmbeddingCache, EmbeddingClient};

pub mod persist;
pub mod ranker;
pub mod scheduler;
pub mod store;

pub use persist::{PersistHandle, INDEX_KEY};
pub use ranker::Ranker;
pub use scheduler::{Backoff, Scheduler};
pub use store::EntryStore;

use store::{embedding_source, hash_content};

pub struct HybridIndex {
    store: Arc<EntryStore>,
    client: EmbeddingClient,
    ranker: Ranker,
    persist: PersistHandle,
    worker: Option<JoinHandle<()>>,
    content_prefix_chars: usize,
    config_disabled: bool,
}

impl HybridIndex {
    /// Open (or create) the index under `settings.data_dir`.
    ///
    /// Loads `index.json` and `embedding_cache.json` if present and starts
    /// the persistence worker, so this must run inside a tokio runtime.
    pub fn open(settings: &IndexSettings, provider: Arc<dyn EmbedProvider>) -> anyhow::Result<Self> {
        settings.validate()?;
        let dir = settings.data_path();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating data directory {}", dir.display()))?;
        let blobs = BlobStore::new(&dir);

        let store = Arc::new(EntryStore::from_entries(load_entries(&blobs)));
        let cache = Arc::new(EmbeddingCache::load(blobs.clone()));
        let client = EmbeddingClient::new(provider, cache);
        if settings.disable_embeddings {
            client.breaker().trip("disabled via configuration");
        }
        let (persist, worker) = PersistHandle::spawn(Arc::clone(&store), blobs, settings.persist_delay());

        tracing::info!(
            entries = store.len(),
            cached_embeddings = client.cache().len(),
            provider = client.provider_id(),
            path = %dir.display(),
            "index loaded"
        );

        Ok(Self {
            store,
            client,
            ranker: Ranker::new(settings.ranking),
            persist,
            worker: Some(worker),
            content_prefix_chars: settings.content_prefix_chars,
            config_disabled: settings.disable_embeddings,
        })
    }

    /// Insert or replace an entry.
    ///
    /// Re-indexing an unchanged, already embedded entry does nothing. An
    /// entry whose embedding source text is unchanged keeps its embedding.
    /// If no embedding can be produced the entry is stored without one.
    pub async fn index(&self, id: &str, kind: &str, title: &str, content: &str, mut metadata: Meta) {
        if id.is_empty() {
            tracing::warn!(kind, title, "ignoring entry with an empty id");
            return;
        }
        metadata.retain(|key, value| {
            let finite = value.is_finite();
            if !finite {
                tracing::warn!(id, key = %key, "dropping non-finite metadata value");
            }
            finite
        });

        let existing = self.store.get(id);
        if let Some(existing) = &existing {
            if existing.has_embedding() && existing.same_payload(kind, title, content, &metadata) {
                return;
            }
        }

        let source = embedding_source(title, content, self.content_prefix_chars);
        let hash = hash_content(&source);
        let reused = existing
            .filter(|e| e.has_embedding() && e.embedding_hash == hash)
            .map(|e| e.embedding.clone());
        let embedding = match reused {
            Some(vector) => Some(vector),
            None => self.embed(id, &source).await,
        };

        let mut entry = IndexEntry::new(id, kind, title, content, metadata);
        if let Some(vector) = embedding {
            entry = entry.with_embedding(vector, hash);
        }
        self.store.put(entry);
        self.persist.schedule();
    }

    async fn embed(&self, id: &str, source: &str) -> Option<Vec<f32>> {
        match self.client.embed(source).await {
            Ok(vector) => Some(vector),
            Err(EmbedError::Disabled | EmbedError::EmptyInput) => None,
            Err(e) => {
                tracing::debug!(id, error = %e, "indexing without embedding");
                None
            }
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<IndexEntry>> {
        self.store.get(id)
    }

    /// Entries of `kind`, newest first; `limit == 0` returns all of them.
    pub fn get_by_type(&self, kind: &str, limit: usize) -> Vec<Arc<IndexEntry>> {
        self.store.by_type(kind, limit)
    }

    /// Most relevant entries first, at most `limit` (`0` for no bound).
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Arc<IndexEntry>> {
        let entries = self.store.snapshot();
        if entries.is_empty() {
            return Vec::new();
        }

        let query_vec = if self.client.is_enabled() {
            match self.client.embed(query).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::debug!(error = %e, "query embedding unavailable, ranking lexically");
                    None
                }
            }
        } else {
            None
        };

        self.ranker.top_k(&entries, query, query_vec.as_deref(), limit)
    }

    pub fn clear_index(&self) {
        self.store.clear();
        self.persist.schedule();
        tracing::info!("index cleared");
    }

    /// Write the current state to disk before returning.
    pub async fn flush_index(&self) -> Result<()> {
        self.persist.flush().await
    }

    pub fn embeddings_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    /// Re-enable vector scoring after the breaker tripped. Returns whether
    /// anything changed; a configuration-level disable is never lifted.
    pub fn reset_embeddings(&self) -> bool {
        if self.config_disabled {
            tracing::debug!("embeddings disabled by configuration; ignoring reset");
            return false;
        }
        self.client.breaker().reset()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn snapshots_written(&self) -> u64 {
        self.persist.snapshots_written()
    }

    /// Flush, stop the persistence worker and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        let flushed = self.persist.flush().await;
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            worker.await.map_err(|e| Error::Operation(format!("persistence worker failed: {e}")))?;
        }
        flushed
    }
}

/// Decode `index.json` entry by entry; an undecodable entry is skipped, not
/// the whole snapshot.
fn load_entries(blobs: &BlobStore) -> HashMap<String, Arc<IndexEntry>> {
    match blobs.load_json::<HashMap<String, serde_json::Value>>(INDEX_KEY) {
        Ok(Some(raw)) => {
            let mut entries = HashMap::with_capacity(raw.len());
            for (id, value) in raw {
                match serde_json::from_value::<IndexEntry>(value) {
                    Ok(mut entry) => {
                        entry.refresh_lowercase();
                        entries.insert(id, Arc::new(entry));
                    }
                    Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable index entry"),
                }
            }
            entries
        }
        Ok(None) => HashMap::new(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable index snapshot");
            HashMap::new()
        }
    }
}
