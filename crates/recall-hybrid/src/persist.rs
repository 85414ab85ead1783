//! Debounced background writer for the `index.json` snapshot.
//!
//! One task owns every write of the snapshot. `schedule` is a non-blocking
//! nudge into a size-1 channel; a burst of nudges collapses into a single
//! write once `delay` passes without a new one. `flush` bypasses the timer
//! and waits for the write to land.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use recall_core::blob_store::BlobStore;
use recall_core::error::{Error, Result};
use recall_core::types::IndexEntry;

use crate::store::EntryStore;

pub const INDEX_KEY: &str = "index.json";

type FlushAck = oneshot::Sender<Result<()>>;

pub struct PersistHandle {
    requests: mpsc::Sender<()>,
    flushes: mpsc::Sender<FlushAck>,
    snapshots: Arc<AtomicU64>,
}

impl PersistHandle {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(store: Arc<EntryStore>, blobs: BlobStore, delay: Duration) -> (Self, JoinHandle<()>) {
        let (requests, request_rx) = mpsc::channel(1);
        let (flushes, flush_rx) = mpsc::channel(4);
        let snapshots = Arc::new(AtomicU64::new(0));
        let worker = Worker { store, blobs, delay, snapshots: Arc::clone(&snapshots) };
        let handle = tokio::spawn(worker.run(request_rx, flush_rx));
        (Self { requests, flushes, snapshots }, handle)
    }

    /// Ask for a debounced write. Dropped silently if one is already queued.
    pub fn schedule(&self) {
        match self.requests.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!("persist requested after worker stopped");
            }
        }
    }

    /// Write the current state now and wait for it to reach disk.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.flushes.send(ack).await.map_err(|_| worker_stopped())?;
        done.await.map_err(|_| worker_stopped())?
    }

    pub fn snapshots_written(&self) -> u64 {
        self.snapshots.load(Ordering::Relaxed)
    }
}

fn worker_stopped() -> Error {
    Error::Operation("persistence worker stopped".into())
}

struct Worker {
    store: Arc<EntryStore>,
    blobs: BlobStore,
    delay: Duration,
    snapshots: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self, mut requests: mpsc::Receiver<()>, mut flushes: mpsc::Receiver<FlushAck>) {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(()) => deadline = Some(Instant::now() + self.delay),
                    None => break,
                },
                flush = flushes.recv() => match flush {
                    Some(ack) => {
                        deadline = None;
                        let result = self.write().await;
                        let _ = ack.send(result);
                    }
                    None => break,
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if let Err(e) = self.write().await {
                        tracing::warn!(error = %e, "failed to persist index");
                    }
                }
            }
        }

        // Handle dropped: don't lose a write that was still waiting on the timer.
        if deadline.is_some() || requests.try_recv().is_ok() {
            if let Err(e) = self.write().await {
                tracing::warn!(error = %e, "failed to persist index on shutdown");
            }
        }
        tracing::debug!("persistence worker stopped");
    }

    async fn write(&self) -> Result<()> {
        let snapshot = self.store.snapshot_map();
        let blobs = self.blobs.clone();
        let count = snapshot.len();
        tokio::task::spawn_blocking(move || {
            let view: BTreeMap<&str, &IndexEntry> =
                snapshot.iter().map(|(id, entry)| (id.as_str(), entry.as_ref())).collect();
            blobs.save_json(INDEX_KEY, &view)
        })
        .await
        .map_err(|e| Error::Operation(format!("persist task failed: {e}")))??;

        self.snapshots.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(entries = count, "index snapshot written");
        Ok(())
    }
}
