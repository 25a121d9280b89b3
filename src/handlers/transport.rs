//! # Transport Bridge Handlers
//!
//! Ingestion endpoints for the browser-automation bridge: chat events,
//! late contact-name resolutions and session lifecycle reports. Every
//! call doubles as a heartbeat for the supervisor.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::ingest::normalizer::RawChatEvent;
use crate::ingest::{ContactOutcome, ContactResolution, IngestOutcome};
use crate::server::AppState;
use crate::transport::{BridgeLifecycleEvent, ConnectionState};

/// Acknowledgement returned for bridge pushes
#[derive(Debug, Serialize, ToSchema)]
pub struct BridgeAcceptResponse {
    /// Always "accepted"; the pipeline outcome is informational
    pub status: String,
    /// What the pipeline did with the payload
    #[schema(example = "resolved")]
    pub outcome: String,
}

/// Ingest one chat event from the bridge
#[utoipa::path(
    post,
    path = "/transport/events",
    security(("bearer_auth" = [])),
    request_body = RawChatEvent,
    responses(
        (status = 202, description = "Event accepted; outcome reports the pipeline result", body = BridgeAcceptResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "transport"
)]
pub async fn ingest_event(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(raw): Json<RawChatEvent>,
) -> (StatusCode, Json<BridgeAcceptResponse>) {
    state.connection.touch();

    let outcome = match state.pipeline.handle_event(raw).await {
        IngestOutcome::Resolved { created: true, .. } => "created",
        IngestOutcome::Resolved { created: false, .. } => "resolved",
        IngestOutcome::DroppedInvalid => "dropped_invalid",
        IngestOutcome::DroppedDuplicate => "dropped_duplicate",
        IngestOutcome::DroppedPersistence => "dropped_persistence",
    };

    (
        StatusCode::ACCEPTED,
        Json(BridgeAcceptResponse {
            status: "accepted".to_string(),
            outcome: outcome.to_string(),
        }),
    )
}

/// Apply a late contact-name resolution
#[utoipa::path(
    post,
    path = "/transport/contacts",
    security(("bearer_auth" = [])),
    request_body = ContactResolution,
    responses(
        (status = 202, description = "Resolution accepted; outcome reports the pipeline result", body = BridgeAcceptResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "transport"
)]
pub async fn resolve_contact(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(resolution): Json<ContactResolution>,
) -> (StatusCode, Json<BridgeAcceptResponse>) {
    state.connection.touch();

    let outcome = match state.pipeline.handle_contact_resolved(resolution).await {
        ContactOutcome::Updated(_) => "updated",
        ContactOutcome::Skipped => "skipped",
        ContactOutcome::NotFound => "not_found",
        ContactOutcome::DroppedPersistence => "dropped_persistence",
    };

    (
        StatusCode::ACCEPTED,
        Json(BridgeAcceptResponse {
            status: "accepted".to_string(),
            outcome: outcome.to_string(),
        }),
    )
}

/// Report a session lifecycle event
#[utoipa::path(
    post,
    path = "/transport/state",
    security(("bearer_auth" = [])),
    request_body = BridgeLifecycleEvent,
    responses(
        (status = 202, description = "Lifecycle event applied", body = BridgeAcceptResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "Transition not allowed from the current state", body = ApiError)
    ),
    tag = "transport"
)]
pub async fn report_state(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(event): Json<BridgeLifecycleEvent>,
) -> Result<(StatusCode, Json<BridgeAcceptResponse>), ApiError> {
    state.connection.touch();

    let outcome = match event {
        BridgeLifecycleEvent::QrCode { qr } => {
            state.notifier.emit_qr_code(qr);
            "qr_code"
        }
        BridgeLifecycleEvent::Initializing => {
            apply_transition(&state, ConnectionState::Initializing, None)?;
            "initializing"
        }
        BridgeLifecycleEvent::Authenticated => {
            apply_transition(&state, ConnectionState::Authenticated, None)?;
            "authenticated"
        }
        BridgeLifecycleEvent::Ready => {
            apply_transition(&state, ConnectionState::Ready, None)?;
            "ready"
        }
        BridgeLifecycleEvent::Disconnected { reason } => {
            apply_transition(&state, ConnectionState::Disconnected, reason)?;
            "disconnected"
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(BridgeAcceptResponse {
            status: "accepted".to_string(),
            outcome: outcome.to_string(),
        }),
    ))
}

fn apply_transition(
    state: &AppState,
    next: ConnectionState,
    reason: Option<String>,
) -> Result<(), ApiError> {
    let previous = state.connection.current();

    state.connection.transition(next).map_err(|err| {
        ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT".to_string(),
            err.to_string(),
        )
    })?;

    // Only announce real changes; re-reports of the current state are
    // accepted but silent.
    if previous != next {
        tracing::info!(from = ?previous, to = ?next, "transport state changed");
        state.notifier.emit_connection(next, reason);
    }

    Ok(())
}
