//! # Stats Endpoint Handler

use axum::{extract::State, response::Json};

use crate::error::ApiError;
use crate::server::AppState;
use crate::store::LeadStats;

/// Aggregate pipeline statistics
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Per-status counts plus won-lead value sum/avg", body = LeadStats),
        (status = 503, description = "Store unavailable", body = ApiError)
    ),
    tag = "stats"
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<LeadStats>, ApiError> {
    let stats = state.store.stats().await?;
    Ok(Json(stats))
}
