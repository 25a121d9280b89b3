//! # Leads API Handlers
//!
//! CRUD surface for the sales pipeline. `POST /leads` is an upsert keyed
//! by phone, matching the store contract the ingestion pipeline uses;
//! status and value changes are explicit actions with their own routes.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::ingest::normalizer::normalize_phone;
use crate::models::lead::{LeadResponse, LeadSource, LeadStatus};
use crate::server::AppState;
use crate::store::{LeadUpsert, ListLeadsFilter};

/// Request payload for creating or updating a lead by phone
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertLeadRequest {
    /// Phone number in any common form; normalized before persistence
    #[schema(example = "+994 50 111 22 33")]
    pub phone: String,
    /// Contact display name
    pub display_name: Option<String>,
    /// Latest message or note
    pub last_message: Option<String>,
    /// Pipeline status; applied explicitly, not by the merge
    #[schema(example = "potential")]
    pub status: Option<String>,
    /// Deal value, non-negative
    pub value: Option<f64>,
    /// Product of interest
    pub product_name: Option<String>,
}

/// Query parameters for listing leads
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListLeadsQuery {
    /// Filter by pipeline status
    pub status: Option<String>,
    /// Leads created at or after this timestamp (RFC3339)
    pub start_date: Option<String>,
    /// Leads created at or before this timestamp (RFC3339)
    pub end_date: Option<String>,
    /// Case-insensitive search over name, phone and last message
    pub search: Option<String>,
    /// Maximum number of leads to return (default: 50, max: 200)
    pub limit: Option<u64>,
    /// Number of leads to skip
    pub offset: Option<u64>,
}

/// Request payload for a status change
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of: new, potential, won, lost
    #[schema(example = "won")]
    pub status: String,
}

/// Request payload for a value change
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateValueRequest {
    /// Non-negative deal value
    #[schema(example = 1500.0)]
    pub value: f64,
}

fn parse_status(raw: &str) -> Result<LeadStatus, ApiError> {
    LeadStatus::from_str(raw).map_err(|_| {
        validation_error(
            "status must be one of: new, potential, won, lost",
            serde_json::json!({ "field": "status", "value": raw }),
        )
    })
}

fn parse_lead_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::from_str(raw).map_err(|_| {
        validation_error(
            "id must be a valid UUID",
            serde_json::json!({ "field": "id", "value": raw }),
        )
    })
}

/// Create or update a lead by phone
#[utoipa::path(
    post,
    path = "/leads",
    security(("bearer_auth" = [])),
    request_body = UpsertLeadRequest,
    responses(
        (status = 201, description = "Lead created", body = LeadResponse),
        (status = 200, description = "Existing lead updated", body = LeadResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn create_lead(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<UpsertLeadRequest>,
) -> Result<(StatusCode, Json<LeadResponse>), ApiError> {
    let phone = normalize_phone(&request.phone, &state.config.country_code).ok_or_else(|| {
        validation_error(
            "phone has too few digits",
            serde_json::json!({ "field": "phone", "value": request.phone }),
        )
    })?;

    let status = request.status.as_deref().map(parse_status).transpose()?;

    let upsert = LeadUpsert {
        phone,
        external_id: None,
        display_name: request.display_name.clone(),
        last_message: request.last_message.clone(),
        value: request.value,
        product_name: request.product_name,
        initial_status: status.unwrap_or(LeadStatus::New),
        source: LeadSource::Manual,
        source_message: request.last_message,
        source_contact_name: request.display_name,
    };

    let outcome = state.store.upsert_by_phone(upsert).await?;
    let mut lead = outcome.lead;

    // For an existing lead a supplied status is an explicit
    // reclassification, applied outside the merge.
    if !outcome.created {
        if let Some(status) = status {
            if let Some(updated) = state.store.update_status(lead.id, status).await? {
                lead = updated;
            }
        }
    }

    state.notifier.emit_lead_updated(&lead);

    let code = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(lead.into())))
}

/// List leads with filters
#[utoipa::path(
    get,
    path = "/leads",
    params(ListLeadsQuery),
    responses(
        (status = 200, description = "Leads listed, most recently updated first", body = [LeadResponse]),
        (status = 400, description = "Invalid query parameters", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<Vec<LeadResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(crate::store::DEFAULT_LIST_LIMIT);
    if limit < 1 || limit > 200 {
        return Err(validation_error(
            "limit must be between 1 and 200",
            serde_json::json!({ "field": "limit", "value": limit }),
        ));
    }

    let status = query.status.as_deref().map(parse_status).transpose()?;

    let parse_date = |field: &str, value: Option<&str>| -> Result<Option<DateTime<Utc>>, ApiError> {
        value
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| {
                        validation_error(
                            &format!("{field} must be a valid RFC3339 timestamp"),
                            serde_json::json!({ "field": field, "value": raw }),
                        )
                    })
            })
            .transpose()
    };

    let filter = ListLeadsFilter {
        status,
        start_date: parse_date("start_date", query.start_date.as_deref())?,
        end_date: parse_date("end_date", query.end_date.as_deref())?,
        search: query.search.filter(|s| !s.trim().is_empty()),
        limit: Some(limit),
        offset: query.offset,
    };

    let leads = state.store.list(filter).await?;
    Ok(Json(leads.into_iter().map(LeadResponse::from).collect()))
}

/// Change a lead's pipeline status
#[utoipa::path(
    put,
    path = "/leads/{id}/status",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Lead id (UUID)")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = LeadResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn update_lead_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<LeadResponse>, ApiError> {
    let id = parse_lead_id(&id)?;
    let status = parse_status(&request.status)?;

    let lead = state
        .store
        .update_status(id, status)
        .await?
        .ok_or_else(|| not_found(&format!("lead '{id}' not found")))?;

    state.notifier.emit_lead_updated(&lead);
    Ok(Json(lead.into()))
}

/// Change a lead's deal value
#[utoipa::path(
    put,
    path = "/leads/{id}/value",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Lead id (UUID)")),
    request_body = UpdateValueRequest,
    responses(
        (status = 200, description = "Value updated", body = LeadResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn update_lead_value(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<String>,
    Json(request): Json<UpdateValueRequest>,
) -> Result<Json<LeadResponse>, ApiError> {
    let id = parse_lead_id(&id)?;

    if !request.value.is_finite() || request.value < 0.0 {
        return Err(validation_error(
            "value must be a non-negative number",
            serde_json::json!({ "field": "value", "value": request.value }),
        ));
    }

    let lead = state
        .store
        .update_value(id, request.value)
        .await?
        .ok_or_else(|| not_found(&format!("lead '{id}' not found")))?;

    state.notifier.emit_lead_updated(&lead);
    Ok(Json(lead.into()))
}

/// Delete a lead
#[utoipa::path(
    delete,
    path = "/leads/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Lead id (UUID)")),
    responses(
        (status = 200, description = "Lead deleted; body is the removed lead", body = LeadResponse),
        (status = 400, description = "Invalid id", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<String>,
) -> Result<Json<LeadResponse>, ApiError> {
    let id = parse_lead_id(&id)?;

    let lead = state
        .store
        .delete(id)
        .await?
        .ok_or_else(|| not_found(&format!("lead '{id}' not found")))?;

    state.notifier.emit_lead_deleted(lead.id);
    Ok(Json(lead.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_accepts_pipeline_states() {
        assert_eq!(parse_status("won").unwrap(), LeadStatus::Won);
        assert!(parse_status("archived").is_err());
    }

    #[test]
    fn parse_lead_id_rejects_garbage() {
        assert!(parse_lead_id("not-a-uuid").is_err());
        assert!(parse_lead_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }
}
