//! WebSocket handler for the dashboard channel.
//!
//! Server-push only: on connect the subscriber receives a full-state
//! snapshot (connection state plus recent leads), then the live
//! [`ServerEvent`] stream. There is no replay on reconnect; a lagging
//! subscriber loses messages and re-syncs from the next snapshot.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::broadcast;

use crate::models::lead::LeadResponse;
use crate::notify::ServerEvent;
use crate::server::AppState;
use crate::store::ListLeadsFilter;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual dashboard connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so no event in between is lost.
    let mut events = state.notifier.subscribe();

    let snapshot = ServerEvent::Snapshot {
        connection_state: state.connection.current(),
        leads: snapshot_leads(&state).await,
    };
    if !send_event(&mut sender, &snapshot).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "dashboard subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // The channel is server-push only; client text is ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Bounded read of recent leads for the snapshot; a slow store degrades
/// to an empty list rather than hanging the new connection.
async fn snapshot_leads(state: &AppState) -> Vec<LeadResponse> {
    let timeout = Duration::from_secs(state.config.snapshot.timeout_seconds);
    let filter = ListLeadsFilter {
        limit: Some(state.config.snapshot.limit),
        ..Default::default()
    };

    match tokio::time::timeout(timeout, state.store.list(filter)).await {
        Ok(Ok(leads)) => leads.into_iter().map(LeadResponse::from).collect(),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "snapshot lead read failed");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "snapshot lead read timed out");
            Vec::new()
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize server event");
            return true;
        }
    };

    sender.send(Message::Text(text.into())).await.is_ok()
}
