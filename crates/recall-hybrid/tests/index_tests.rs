use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use recall_core::config::IndexSettings;
use recall_core::error::EmbedError;
use recall_core::traits::EmbedProvider;
use recall_core::types::{Meta, MetaValue};
use recall_hybrid::{HybridIndex, INDEX_KEY};
use recall_vector::EMBEDDING_CACHE_KEY;

/// Provider answering from a fixed table; unknown texts get `[1.0, 1.0]`.
struct ScriptedProvider {
    calls: AtomicUsize,
    vectors: HashMap<String, Vec<f32>>,
    refuse: bool,
}

impl ScriptedProvider {
    fn new() -> Arc<Self> {
        Self::with_vectors(&[])
    }

    fn with_vectors(vectors: &[(&str, Vec<f32>)]) -> Arc<Self> {
        let vectors = vectors.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        Arc::new(Self { calls: AtomicUsize::new(0), vectors, refuse: false })
    }

    fn refusing() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), vectors: HashMap::new(), refuse: true })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbedProvider for ScriptedProvider {
    fn embedder_id(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(EmbedError::Unreachable("connection refused".into()));
        }
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![1.0, 1.0]))
    }
}

fn settings(dir: &Path) -> IndexSettings {
    IndexSettings { data_dir: dir.to_string_lossy().into_owned(), ..IndexSettings::default() }
}

fn open(dir: &TempDir, provider: &Arc<ScriptedProvider>) -> HybridIndex {
    HybridIndex::open(&settings(dir.path()), provider.clone()).expect("open index")
}

fn ids(entries: &[Arc<recall_core::types::IndexEntry>]) -> Vec<String> {
    entries.iter().map(|e| e.id.clone()).collect()
}

fn meta(source: &str) -> Meta {
    let mut m = Meta::new();
    m.insert("source".into(), MetaValue::from(source));
    m
}

/// Unit vector at cosine `sim` from `[1, 0]`.
fn at_similarity(sim: f32) -> Vec<f32> {
    vec![sim, (1.0 - sim * sim).sqrt()]
}

fn read_index_file(dir: &Path) -> serde_json::Map<String, serde_json::Value> {
    let raw = std::fs::read(dir.join(INDEX_KEY)).expect("index.json exists");
    let value: serde_json::Value = serde_json::from_slice(&raw).expect("index.json is JSON");
    value.as_object().cloned().expect("index.json is an object")
}

#[tokio::test]
async fn reindexing_unchanged_entry_calls_provider_once() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);

    index.index("1", "news", "Bitcoin hits new high", "Crypto rally", meta("feed")).await;
    index.index("1", "news", "Bitcoin hits new high", "Crypto rally", meta("feed")).await;

    assert_eq!(provider.calls(), 1);
    assert!(index.get_by_id("1").unwrap().has_embedding());
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn metadata_change_reuses_embedding() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);

    index.index("1", "news", "Bitcoin hits new high", "Crypto rally", meta("feed-a")).await;
    let before = index.get_by_id("1").unwrap();
    index.index("1", "news", "Bitcoin hits new high", "Crypto rally", meta("feed-b")).await;
    let after = index.get_by_id("1").unwrap();

    assert_eq!(provider.calls(), 1, "same source text keeps the embedding");
    assert_eq!(after.metadata["source"], MetaValue::from("feed-b"));
    assert_eq!(after.embedding, before.embedding);
    assert_eq!(after.embedding_hash, before.embedding_hash);

    index.index("1", "news", "Bitcoin hits new high", "Crypto rally continues", meta("feed-b")).await;
    assert_eq!(provider.calls(), 2, "changed content is embedded again");
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn disabled_embeddings_rank_lexically_without_provider() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let mut cfg = settings(tmp.path());
    cfg.disable_embeddings = true;
    let index = HybridIndex::open(&cfg, provider.clone()).unwrap();

    index.index("1", "news", "Bitcoin hits new high", "", Meta::new()).await;
    index.index("2", "news", "Apple releases new iPhone", "", Meta::new()).await;

    assert_eq!(ids(&index.search("Bitcoin", 10).await), ["1"]);
    assert_eq!(ids(&index.search("iPhone", 10).await), ["2"]);
    assert!(index.search("Tesla", 10).await.is_empty());
    assert_eq!(provider.calls(), 0);
    assert!(!index.embeddings_enabled());
    assert!(!index.reset_embeddings(), "configuration switch cannot be reset");
    assert!(index.get_by_id("1").unwrap().embedding.is_empty());
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn title_hits_outrank_content_hits() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let mut cfg = settings(tmp.path());
    cfg.disable_embeddings = true;
    let index = HybridIndex::open(&cfg, provider).unwrap();

    index.index("body", "news", "Markets today", "analysts discuss bitcoin", Meta::new()).await;
    index.index("head", "news", "Bitcoin slides", "", Meta::new()).await;

    assert_eq!(ids(&index.search("BITCOIN", 0).await), ["head", "body"]);
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn vector_scores_need_lexical_anchor_or_confidence() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::with_vectors(&[
        ("zebra", vec![1.0, 0.0]),
        ("Savanna report", at_similarity(0.4)),
        ("Grassland animals", at_similarity(0.65)),
        ("Zebra herd", at_similarity(0.4)),
        ("Ocean currents", at_similarity(0.1)),
    ]);
    let index = open(&tmp, &provider);

    for (id, title) in [("weak", "Savanna report"), ("strong", "Grassland animals"), ("anchored", "Zebra herd"), ("far", "Ocean currents")] {
        index.index(id, "news", title, "", Meta::new()).await;
    }

    let results = ids(&index.search("zebra", 10).await);
    assert!(results.contains(&"strong".to_string()));
    assert!(results.contains(&"anchored".to_string()));
    assert!(!results.contains(&"weak".to_string()), "0.4 without a lexical hit is noise");
    assert!(!results.contains(&"far".to_string()));
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn search_honours_limit() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let mut cfg = settings(tmp.path());
    cfg.disable_embeddings = true;
    let index = HybridIndex::open(&cfg, provider).unwrap();

    for i in 0..20 {
        let title = if i % 5 == 0 { format!("Rust release {i}") } else { format!("Weekly notes {i}") };
        index.index(&i.to_string(), "news", &title, "mentions rust", Meta::new()).await;
    }

    let top = index.search("rust", 3).await;
    assert_eq!(top.len(), 3);
    assert!(top.iter().all(|e| e.title.starts_with("Rust release")));
    assert_eq!(index.search("rust", 0).await.len(), 20);
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_corpus_search_skips_provider() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);
    assert!(index.search("anything", 10).await.is_empty());
    assert_eq!(provider.calls(), 0);
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn rapid_indexing_is_debounced_and_flush_writes_everything() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);

    for i in 0..50 {
        index.index(&format!("item-{i}"), "news", &format!("Headline {i}"), "body", Meta::new()).await;
    }
    index.flush_index().await.unwrap();

    assert!(index.snapshots_written() <= 2, "wrote {} snapshots", index.snapshots_written());
    let on_disk = read_index_file(tmp.path());
    assert_eq!(on_disk.len(), 50);
    assert_eq!(on_disk["item-7"]["type"], "news");
    assert_eq!(on_disk["item-7"]["title"], "Headline 7");
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn debounced_write_lands_without_flush() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let mut cfg = settings(tmp.path());
    cfg.persist_delay_ms = 20;
    let index = HybridIndex::open(&cfg, provider).unwrap();

    index.index("solo", "video", "Launch stream", "", Meta::new()).await;
    for _ in 0..100 {
        if index.snapshots_written() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(index.snapshots_written(), 1);
    assert!(read_index_file(tmp.path()).contains_key("solo"));
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_provider_trips_breaker_and_degrades_to_lexical() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::refusing();
    let index = open(&tmp, &provider);

    index.index("1", "news", "Bitcoin hits new high", "", Meta::new()).await;
    assert_eq!(provider.calls(), 1);
    assert!(!index.embeddings_enabled());

    index.index("2", "news", "Apple releases new iPhone", "", Meta::new()).await;
    assert_eq!(ids(&index.search("bitcoin", 10).await), ["1"]);
    assert_eq!(provider.calls(), 1, "no provider calls after the trip");
    assert!(index.get_by_id("2").unwrap().embedding.is_empty());

    assert!(index.reset_embeddings());
    index.search("iphone", 10).await;
    assert_eq!(provider.calls(), 2, "reset allows one more attempt");
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn state_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);
    index.index("1", "market", "Gold Futures", "Up two percent", meta("ticker")).await;

    for _ in 0..100 {
        if tmp.path().join(EMBEDDING_CACHE_KEY).is_file() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    index.shutdown().await.unwrap();

    let fresh = ScriptedProvider::new();
    let reopened = open(&tmp, &fresh);
    let entry = reopened.get_by_id("1").expect("entry reloaded");
    assert_eq!(entry.kind, "market");
    assert_eq!(entry.metadata, meta("ticker"));
    assert!(entry.has_embedding());
    assert_eq!(entry.title_lower(), "gold futures");

    reopened.index("1", "market", "Gold Futures", "Up two percent", meta("ticker")).await;
    reopened.index("2", "market", "Gold Futures", "Up two percent", Meta::new()).await;
    assert_eq!(fresh.calls(), 0, "unchanged entry and cached text need no provider");
    assert_eq!(ids(&reopened.search("gold", 10).await).len(), 2);
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(INDEX_KEY), b"{not json").unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);
    assert!(index.is_empty());
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn type_listing_and_clear() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);

    index.index("n1", "news", "First", "", Meta::new()).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    index.index("n2", "news", "Second", "", Meta::new()).await;
    index.index("v1", "video", "Clip", "", Meta::new()).await;

    assert_eq!(ids(&index.get_by_type("news", 0)), ["n2", "n1"]);
    assert_eq!(ids(&index.get_by_type("news", 1)), ["n2"]);
    assert_eq!(index.get_by_type("video", 0).len(), 1);
    assert_eq!(index.len(), 3);

    index.clear_index();
    assert!(index.is_empty());
    assert!(index.get_by_id("n1").is_none());
    index.flush_index().await.unwrap();
    assert!(read_index_file(tmp.path()).is_empty());
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_id_is_ignored() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);
    index.index("", "news", "Orphan", "", Meta::new()).await;
    assert!(index.is_empty());
    assert_eq!(provider.calls(), 0);
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn concurrent_producers_and_readers() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = Arc::new(open(&tmp, &provider));

    let mut tasks = Vec::new();
    for p in 0..4 {
        let index = Arc::clone(&index);
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                index.index(&format!("p{p}-{i}"), "news", &format!("Story {p} {i}"), "shared body", Meta::new()).await;
                index.search("story", 5).await;
            }
        }));
    }
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(index.len(), 40);
    index.flush_index().await.unwrap();
    assert_eq!(read_index_file(tmp.path()).len(), 40);
}

#[tokio::test]
async fn non_finite_metadata_does_not_cost_other_entries() {
    let tmp = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    let index = open(&tmp, &provider);

    let mut bad = meta("feed");
    bad.insert("score".into(), MetaValue::Number(f64::NAN));
    bad.insert("weight".into(), MetaValue::Number(f64::INFINITY));
    index.index("good", "news", "Solar output record", "", meta("feed")).await;
    index.index("bad", "news", "Wind farm expansion", "", bad.clone()).await;

    let stored = index.get_by_id("bad").unwrap();
    assert_eq!(stored.metadata, meta("feed"), "non-finite values are dropped on the way in");

    index.flush_index().await.unwrap();
    let written = index.snapshots_written();
    index.index("bad", "news", "Wind farm expansion", "", bad).await;
    assert_eq!(provider.calls(), 2, "re-index with the same payload is a no-op");
    index.flush_index().await.unwrap();
    assert_eq!(index.snapshots_written(), written + 1, "only the explicit flush wrote");
    index.shutdown().await.unwrap();

    let reopened = open(&tmp, &ScriptedProvider::new());
    assert_eq!(reopened.len(), 2);
    assert!(reopened.get_by_id("good").is_some());
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn one_unreadable_entry_is_skipped_on_load() {
    let tmp = TempDir::new().unwrap();
    let snapshot = r#"{
        "ok": {"id":"ok","type":"news","title":"Kept","content":"","metadata":{"bytes":42},"indexed_at":"2024-05-01T10:00:00Z"},
        "broken": {"id":"broken","type":"news","title":"Lost","content":"","metadata":{"score":null},"indexed_at":"2024-05-01T10:00:00Z"}
    }"#;
    std::fs::write(tmp.path().join(INDEX_KEY), snapshot).unwrap();

    let index = open(&tmp, &ScriptedProvider::new());
    assert_eq!(index.len(), 1);
    let kept = index.get_by_id("ok").unwrap();
    assert_eq!(kept.metadata["bytes"], MetaValue::Int(42));
    assert_eq!(kept.title_lower(), "kept");
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn whole_number_metadata_is_rewritten_unchanged() {
    let tmp = TempDir::new().unwrap();
    let snapshot = r#"{"n1":{"id":"n1","type":"file","title":"Notes","content":"","metadata":{"bytes":42,"ratio":0.5},"indexed_at":"2024-05-01T10:00:00Z"}}"#;
    std::fs::write(tmp.path().join(INDEX_KEY), snapshot).unwrap();

    let index = open(&tmp, &ScriptedProvider::new());
    index.flush_index().await.unwrap();
    index.shutdown().await.unwrap();

    let raw = std::fs::read_to_string(tmp.path().join(INDEX_KEY)).unwrap();
    assert!(raw.contains(r#""bytes":42,"#), "{raw}");
    assert!(!raw.contains("42.0"), "{raw}");
    assert!(raw.contains(r#""ratio":0.5"#), "{raw}");
}
