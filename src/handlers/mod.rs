//! # API Handlers
//!
//! Axum handlers for the dashboard API, the transport-bridge endpoints
//! and the WebSocket channel.

pub mod leads;
pub mod stats;
pub mod transport;
pub mod ws;

use axum::{extract::State, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::server::AppState;
use crate::transport::ConnectionState;

/// Basic service identity returned at the root.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub name: String,
    /// The version of the service
    pub version: String,
}

/// Service identity
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service info", body = ServiceInfo)
    ),
    tag = "meta"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health snapshot for the service and its collaborators.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub connection_state: ConnectionState,
    pub store_ok: bool,
}

/// Service health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health snapshot", body = HealthResponse)
    ),
    tag = "meta"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // A cheap aggregate read doubles as the store probe.
    let store_ok = state.store.stats().await.is_ok();

    Json(HealthResponse {
        status: if store_ok { "ok" } else { "degraded" }.to_string(),
        connection_state: state.connection.current(),
        store_ok,
    })
}
