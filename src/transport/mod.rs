//! # Transport Boundary
//!
//! The browser-automation WhatsApp client is an external process; this
//! module holds the server-side view of it. Connection readiness is an
//! explicit [`ConnectionState`] value object behind a watch channel
//! instead of ambient globals; the ingestion core itself is
//! transport-agnostic and only `/transport`-facing calls consult it.

pub mod supervisor;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
// tokio's Instant respects paused test time, unlike std's.
use tokio::time::Instant;
use utoipa::ToSchema;

/// Lifecycle state of the chat-transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Offline,
    Initializing,
    Authenticated,
    Ready,
    Disconnected,
}

impl ConnectionState {
    /// Allowed transitions: offline → initializing → authenticated →
    /// ready; any state may drop to disconnected; a disconnected bridge
    /// re-enters at initializing.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Offline, Initializing)
                | (Initializing, Authenticated)
                | (Authenticated, Ready)
                | (Disconnected, Initializing)
                | (_, Disconnected)
        )
    }

    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

/// Rejected state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid connection state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Lifecycle events reported by the bridge via `POST /transport/state`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeLifecycleEvent {
    /// Pairing QR code is available for the dashboard to render
    QrCode { qr: String },
    Initializing,
    Authenticated,
    Ready,
    Disconnected { reason: Option<String> },
}

/// Shared, observable connection state plus a bridge heartbeat.
pub struct ConnectionTracker {
    tx: watch::Sender<ConnectionState>,
    last_seen: Mutex<Instant>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Offline);
        Self {
            tx,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Watch for state changes (used by anything that wants to react to
    /// readiness without polling).
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply a transition, enforcing the state machine.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        let mut result = Ok(next);
        self.tx.send_if_modified(|current| {
            if *current == next {
                // Re-announcing the current state is harmless.
                result = Ok(next);
                return false;
            }
            if current.can_transition_to(next) {
                *current = next;
                result = Ok(next);
                true
            } else {
                result = Err(InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        result
    }

    /// Record bridge liveness; every `/transport` call touches this.
    pub fn touch(&self) {
        *self.last_seen.lock().expect("heartbeat mutex poisoned") = Instant::now();
    }

    /// Time since the bridge was last heard from.
    pub fn since_last_seen(&self) -> std::time::Duration {
        self.last_seen
            .lock()
            .expect("heartbeat mutex poisoned")
            .elapsed()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.current(), ConnectionState::Offline);

        tracker.transition(ConnectionState::Initializing).unwrap();
        tracker.transition(ConnectionState::Authenticated).unwrap();
        tracker.transition(ConnectionState::Ready).unwrap();
        assert!(tracker.current().is_ready());
    }

    #[test]
    fn any_state_can_disconnect_and_reconnect() {
        let tracker = ConnectionTracker::new();
        tracker.transition(ConnectionState::Disconnected).unwrap();
        assert_eq!(tracker.current(), ConnectionState::Disconnected);

        tracker.transition(ConnectionState::Initializing).unwrap();
        assert_eq!(tracker.current(), ConnectionState::Initializing);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let tracker = ConnectionTracker::new();

        let err = tracker.transition(ConnectionState::Ready).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: ConnectionState::Offline,
                to: ConnectionState::Ready,
            }
        );
        // State is unchanged after a rejected transition.
        assert_eq!(tracker.current(), ConnectionState::Offline);
    }

    #[test]
    fn reannouncing_current_state_is_accepted() {
        let tracker = ConnectionTracker::new();
        tracker.transition(ConnectionState::Initializing).unwrap();
        tracker.transition(ConnectionState::Initializing).unwrap();
        assert_eq!(tracker.current(), ConnectionState::Initializing);
    }

    #[test]
    fn watchers_observe_transitions() {
        let tracker = ConnectionTracker::new();
        let rx = tracker.subscribe();

        tracker.transition(ConnectionState::Initializing).unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Initializing);
    }
}
