//! Time-windowed duplicate suppression keyed by transport message id.
//!
//! The gate is a bounded best-effort cache, not a correctness-critical
//! ledger: suppression beyond the retention window (or across a restart)
//! relies on the store upsert being idempotent.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Windowed set of recently seen external message ids.
pub struct DedupGate {
    seen: Mutex<LruCache<String, Instant>>,
    window: Duration,
}

impl DedupGate {
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
            window,
        }
    }

    /// Record an id; `true` means first sight (proceed), `false` means a
    /// repeat within the retention window (drop).
    ///
    /// Check-and-insert runs in a single critical section so two
    /// near-simultaneous deliveries of one id cannot both pass.
    pub fn observe(&self, external_id: &str) -> bool {
        let mut seen = self.seen.lock().expect("dedup mutex poisoned");

        if let Some(first_seen) = seen.get(external_id) {
            if first_seen.elapsed() < self.window {
                return false;
            }
        }

        seen.put(external_id.to_string(), Instant::now());
        true
    }

    /// Purge entries older than the retention window.
    pub fn sweep(&self) {
        let mut seen = self.seen.lock().expect("dedup mutex poisoned");
        let window = self.window;

        // LruCache has no retain; pop stale entries from the LRU end.
        while let Some((_, first_seen)) = seen.peek_lru() {
            if first_seen.elapsed() >= window {
                seen.pop_lru();
            } else {
                break;
            }
        }
    }

    /// Number of tracked ids (stale entries included until the next sweep).
    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodic cleanup loop; runs until the token is cancelled.
pub async fn run_sweeper(
    gate: std::sync::Arc<DedupGate>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tracing::debug!(interval = ?interval, "starting dedup sweeper");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("dedup sweeper shutdown requested");
                break;
            }
            _ = sleep(interval) => {
                let before = gate.len();
                gate.sweep();
                let purged = before.saturating_sub(gate.len());
                if purged > 0 {
                    tracing::trace!(purged, "purged expired dedup entries");
                }
            }
        }
    }
}
