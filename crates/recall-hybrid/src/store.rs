//! Authoritative in-memory map from entry id to entry.
//!
//! Locks are held only for map access; callers copy out `Arc`s and do any
//! network or disk work after the guard is released.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use recall_core::types::IndexEntry;

#[derive(Default)]
pub struct EntryStore {
    entries: RwLock<HashMap<String, Arc<IndexEntry>>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Arc<IndexEntry>>) -> Self {
        Self { entries: RwLock::new(entries) }
    }

    pub fn get(&self, id: &str) -> Option<Arc<IndexEntry>> {
        self.entries.read().get(id).cloned()
    }

    pub fn put(&self, entry: IndexEntry) {
        let entry = Arc::new(entry);
        self.entries.write().insert(entry.id.clone(), entry);
    }

    /// Replace the whole map with an empty one.
    pub fn clear(&self) {
        *self.entries.write() = HashMap::new();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<Arc<IndexEntry>> {
        self.entries.read().values().cloned().collect()
    }

    /// Point-in-time copy of the map, for persistence.
    pub fn snapshot_map(&self) -> HashMap<String, Arc<IndexEntry>> {
        self.entries.read().clone()
    }

    /// Entries of one type, newest `indexed_at` first; `limit == 0` means all.
    pub fn by_type(&self, kind: &str, limit: usize) -> Vec<Arc<IndexEntry>> {
        let mut entries: Vec<Arc<IndexEntry>> =
            self.entries.read().values().filter(|e| e.kind == kind).cloned().collect();
        entries.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        if limit > 0 {
            entries.truncate(limit);
        }
        entries
    }
}

/// The text that gets embedded for an entry: the title, plus a space and the
/// first `max_chars` characters of the content when there is any content.
pub fn embedding_source(title: &str, content: &str, max_chars: usize) -> String {
    if content.is_empty() {
        return title.to_string();
    }
    let prefix_end = content.char_indices().nth(max_chars).map_or(content.len(), |(i, _)| i);
    format!("{title} {}", &content[..prefix_end])
}

/// Hex BLAKE3 digest of the embedding source.
pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}
