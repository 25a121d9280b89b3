//! # Notifier
//!
//! Fan-out of server events to connected dashboard observers over a tokio
//! broadcast channel. Previews are fire-and-forget; the resolved emission
//! fires exactly once per upsert outcome and supersedes any preview for
//! the same phone. Lagging subscribers lose messages rather than stall
//! the pipeline (at-most-once, no backlog replay).

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ingest::normalizer::{Direction, MessageEvent};
use crate::models::lead::{Lead, LeadResponse};
use crate::transport::ConnectionState;

/// Provisional message payload for the fast path. Observers must treat
/// this as disposable and replace it with the resolved event.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub phone: String,
    pub display_name: String,
    pub body: String,
    pub direction: Direction,
}

/// Events pushed to dashboard subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Pairing QR code from the transport bridge
    QrCode { qr: String },
    Authenticated,
    Ready,
    Disconnected { reason: Option<String> },
    /// A chat message; `is_preview` disambiguates the fast emit from the
    /// authoritative one. Observers reconcile by lead id or phone,
    /// replacing rather than appending.
    NewMessage {
        is_preview: bool,
        phone: String,
        display_name: Option<String>,
        body: String,
        direction: Direction,
        lead: Option<LeadResponse>,
    },
    /// An explicit lead mutation (status/value edits, name enrichment)
    LeadUpdated { lead: LeadResponse },
    LeadDeleted { id: Uuid },
    /// Initial full-state snapshot sent once per new subscriber
    Snapshot {
        connection_state: ConnectionState,
        leads: Vec<LeadResponse>,
    },
}

/// Broadcast handle shared across the pipeline and API handlers.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ServerEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe a new observer. Only events sent after this call are
    /// delivered; the caller is responsible for sending a snapshot first.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Best-effort fast-path emission; may be seen by zero observers.
    pub fn emit_preview(&self, preview: MessagePreview) {
        self.send(ServerEvent::NewMessage {
            is_preview: true,
            phone: preview.phone,
            display_name: Some(preview.display_name),
            body: preview.body,
            direction: preview.direction,
            lead: None,
        });
    }

    /// Authoritative emission for a resolved message event; called exactly
    /// once per upsert outcome.
    pub fn emit_resolved(&self, lead: &Lead, event: &MessageEvent) {
        self.send(ServerEvent::NewMessage {
            is_preview: false,
            phone: lead.phone.clone(),
            display_name: lead.display_name.clone(),
            body: event.body.clone(),
            direction: event.direction,
            lead: Some(lead.clone().into()),
        });
    }

    pub fn emit_lead_updated(&self, lead: &Lead) {
        self.send(ServerEvent::LeadUpdated {
            lead: lead.clone().into(),
        });
    }

    pub fn emit_lead_deleted(&self, id: Uuid) {
        self.send(ServerEvent::LeadDeleted { id });
    }

    pub fn emit_qr_code(&self, qr: String) {
        self.send(ServerEvent::QrCode { qr });
    }

    pub fn emit_connection(&self, state: ConnectionState, reason: Option<String>) {
        match state {
            ConnectionState::Authenticated => self.send(ServerEvent::Authenticated),
            ConnectionState::Ready => self.send(ServerEvent::Ready),
            ConnectionState::Disconnected => self.send(ServerEvent::Disconnected { reason }),
            // Offline/Initializing have no dedicated dashboard event.
            _ => {}
        }
    }

    fn send(&self, event: ServerEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}
