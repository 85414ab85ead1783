//! Process-wide embedding cache keyed by the exact trimmed source text.
//!
//! Entries never expire: identical text always yields the identical vector.
//! The cache is loaded once at startup and written back opportunistically
//! after inserts. Background writes are coalesced: while one is queued,
//! further requests are folded into it, and writes are serialized so the
//! newest state always lands last.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use recall_core::blob_store::BlobStore;
use recall_core::error::Result;

pub const EMBEDDING_CACHE_KEY: &str = "embedding_cache.json";

#[derive(Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, Vec<f32>>>,
    blobs: Option<BlobStore>,
    persist_gate: tokio::sync::Mutex<()>,
    persist_queued: AtomicBool,
    snapshots: AtomicU64,
}

impl EmbeddingCache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load `embedding_cache.json` from `blobs`. Missing or unreadable
    /// snapshots start an empty cache.
    pub fn load(blobs: BlobStore) -> Self {
        let entries = match blobs.load_json::<HashMap<String, Vec<f32>>>(EMBEDDING_CACHE_KEY) {
            Ok(Some(mut map)) => {
                map.retain(|_, v| !v.is_empty());
                tracing::debug!(entries = map.len(), "loaded embedding cache");
                map
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable embedding cache");
                HashMap::new()
            }
        };
        Self { entries: RwLock::new(entries), blobs: Some(blobs), ..Self::default() }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.read().get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, vector: Vec<f32>) {
        if vector.is_empty() {
            return;
        }
        self.entries.write().insert(key.into(), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of snapshots written to disk so far.
    pub fn snapshots_written(&self) -> u64 {
        self.snapshots.load(Ordering::Relaxed)
    }

    /// Write the current snapshot synchronously. No-op for in-memory caches.
    pub fn persist(&self) -> Result<()> {
        let Some(blobs) = &self.blobs else { return Ok(()) };
        let snapshot = self.entries.read().clone();
        blobs.save_json(EMBEDDING_CACHE_KEY, &snapshot)?;
        self.snapshots.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Best-effort asynchronous snapshot; failures are logged, never returned.
    /// A request made while another is still queued is folded into it.
    pub fn persist_in_background(self: &Arc<Self>) {
        if self.blobs.is_none() || self.persist_queued.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.persist_queued.store(false, Ordering::Release);
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "failed to persist embedding cache");
            }
            return;
        };
        let cache = Arc::clone(self);
        handle.spawn(async move {
            let _gate = cache.persist_gate.lock().await;
            // Cleared before the snapshot is taken so later inserts queue a fresh write.
            cache.persist_queued.store(false, Ordering::Release);
            let writer = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || writer.persist()).await {
                Ok(Ok(())) => tracing::debug!("embedding cache persisted"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist embedding cache"),
                Err(e) => tracing::warn!(error = %e, "embedding cache persist task failed"),
            }
        });
    }
}
