//! Cancellable periodic tasks with retry backoff.
//!
//! Producers that refresh content on a cadence (feed readers, directory
//! watchers) register a job here instead of rescheduling themselves. A job
//! returns `anyhow::Result<()>`; failures are logged and retried after an
//! exponential backoff, and `shutdown` stops every task deterministically.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Retry delay after consecutive failures: `initial`, doubled per failure,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial: Duration::from_secs(1), max: Duration::from_secs(60) }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

pub struct Scheduler {
    stop: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self { stop, tasks: Vec::new() }
    }

    /// Run `job` now and then every `every` until shutdown.
    pub fn spawn_periodic<F, Fut>(&mut self, name: impl Into<String>, every: Duration, backoff: Backoff, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let mut stop = self.stop.subscribe();

        let handle = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                if *stop.borrow() {
                    break;
                }
                let wait = match job().await {
                    Ok(()) => {
                        if failures > 0 {
                            tracing::info!(task = %task_name, "scheduled task recovered");
                        }
                        failures = 0;
                        every
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let wait = backoff.delay(failures);
                        tracing::warn!(
                            task = %task_name,
                            error = %e,
                            failures,
                            retry_in_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                            "scheduled task failed"
                        );
                        wait
                    }
                };
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    _ = stop.changed() => break,
                }
            }
            tracing::debug!(task = %task_name, "scheduled task stopped");
        });

        tracing::debug!(task = %name, every_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX), "scheduled task registered");
        self.tasks.push((name, handle));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::warn!(task = %name, error = %e, "scheduled task ended abnormally");
            }
        }
    }
}
