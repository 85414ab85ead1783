use std::sync::atomic::{AtomicBool, Ordering};

/// Latch that disables vector scoring after the provider proves unreachable.
///
/// The enabled -> disabled transition is a compare-and-swap, so the trip is
/// logged exactly once no matter how many callers fail concurrently.
#[derive(Debug)]
pub struct CircuitBreaker {
    enabled: AtomicBool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self { enabled: AtomicBool::new(true) }
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disable embeddings. Returns true only for the call that flipped the latch.
    pub fn trip(&self, reason: &str) -> bool {
        let flipped = self
            .enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            tracing::warn!(reason, "embeddings disabled");
        }
        flipped
    }

    /// Re-enable embeddings. Returns true if the latch was tripped.
    pub fn reset(&self) -> bool {
        let flipped = self
            .enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            tracing::info!("embeddings re-enabled");
        }
        flipped
    }
}
