//! Bridge watchdog.
//!
//! Marks the connection disconnected when the bridge heartbeat goes
//! stale and notifies observers, with jittered backoff between probes so
//! a dead bridge is not hammered. The reconnect itself is the bridge's
//! job; re-announcing its lifecycle over `/transport/state` resets the
//! watchdog. Kept fully outside the ingestion core.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::notify::Notifier;

use super::{ConnectionState, ConnectionTracker};

/// Heartbeat supervisor for the transport bridge.
pub struct TransportSupervisor {
    tracker: Arc<ConnectionTracker>,
    notifier: Notifier,
    heartbeat_timeout: Duration,
    probe_interval: Duration,
    backoff_max: Duration,
}

impl TransportSupervisor {
    pub fn new(tracker: Arc<ConnectionTracker>, notifier: Notifier, cfg: &TransportConfig) -> Self {
        Self {
            tracker,
            notifier,
            heartbeat_timeout: Duration::from_secs(cfg.heartbeat_timeout_seconds),
            probe_interval: Duration::from_secs(cfg.probe_interval_seconds),
            backoff_max: Duration::from_secs(cfg.probe_backoff_max_seconds),
        }
    }

    /// Run until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            heartbeat_timeout = ?self.heartbeat_timeout,
            probe_interval = ?self.probe_interval,
            "starting transport supervisor"
        );

        let mut delay = self.probe_interval;

        loop {
            let jittered = jitter(delay);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("transport supervisor shutdown requested");
                    break;
                }
                _ = sleep(jittered) => {}
            }

            let state = self.tracker.current();
            let stale = self.tracker.since_last_seen() > self.heartbeat_timeout;

            match state {
                ConnectionState::Ready | ConnectionState::Authenticated if stale => {
                    tracing::warn!(
                        last_seen = ?self.tracker.since_last_seen(),
                        "bridge heartbeat stale, marking disconnected"
                    );
                    if self
                        .tracker
                        .transition(ConnectionState::Disconnected)
                        .is_ok()
                    {
                        self.notifier.emit_connection(
                            ConnectionState::Disconnected,
                            Some("heartbeat timeout".to_string()),
                        );
                    }
                    delay = self.probe_interval;
                }
                ConnectionState::Disconnected | ConnectionState::Offline => {
                    // Nothing to watch; back off until the bridge reports in.
                    delay = (delay * 2).min(self.backoff_max);
                }
                _ => {
                    delay = self.probe_interval;
                }
            }
        }
    }
}

/// Up to 10% random jitter so probes from restarts do not align.
fn jitter(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0..1.1);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ServerEvent;

    fn test_config() -> TransportConfig {
        TransportConfig {
            heartbeat_timeout_seconds: 60,
            probe_interval_seconds: 30,
            probe_backoff_max_seconds: 300,
        }
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let base = Duration::from_secs(30);
        for _ in 0..100 {
            let jittered = jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= base.mul_f64(1.1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_heartbeat_marks_disconnected_and_notifies() {
        let tracker = Arc::new(ConnectionTracker::new());
        tracker.transition(ConnectionState::Initializing).unwrap();
        tracker.transition(ConnectionState::Authenticated).unwrap();
        tracker.transition(ConnectionState::Ready).unwrap();

        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();

        let supervisor =
            TransportSupervisor::new(Arc::clone(&tracker), notifier.clone(), &test_config());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(shutdown.clone()));

        // Advance past the heartbeat timeout and one probe interval;
        // paused-time auto-advance fires the sleeps immediately.
        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Disconnected { .. }));
        assert_eq!(tracker.current(), ConnectionState::Disconnected);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
