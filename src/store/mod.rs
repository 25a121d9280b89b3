//! # Lead Store
//!
//! Persistence abstraction for leads. Two implementations exist: a
//! SeaORM-backed relational store and a flat-file JSON store. The upsert
//! contract is the correctness backstop for the whole ingestion pipeline:
//! concurrent upserts for one phone must serialize to a single row, and
//! the preserve-unless-supplied merge must run atomically so interleaved
//! writers cannot lose updates.

pub mod database;
pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::lead::{Lead, LeadSource, LeadStatus};

pub use database::DatabaseLeadStore;
pub use file::FileLeadStore;

/// Errors surfaced by lead store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("file store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Field set applied by `upsert_by_phone`.
///
/// `Option` fields follow the merge policy: `Some` overwrites, `None`
/// preserves whatever the row already holds. The `initial_*` fields and
/// `source` apply only when the upsert creates the row; `status`,
/// `source_message`, `source_contact_name` and `created_at` are never
/// touched on an existing row.
#[derive(Debug, Clone)]
pub struct LeadUpsert {
    pub phone: String,
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub last_message: Option<String>,
    pub value: Option<f64>,
    pub product_name: Option<String>,
    pub initial_status: LeadStatus,
    pub source: LeadSource,
    pub source_message: Option<String>,
    pub source_contact_name: Option<String>,
}

impl LeadUpsert {
    /// An upsert that touches nothing but the phone key; useful as a base
    /// for single-field updates such as the enriched name path.
    pub fn empty(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            external_id: None,
            display_name: None,
            last_message: None,
            value: None,
            product_name: None,
            initial_status: LeadStatus::New,
            source: LeadSource::Whatsapp,
            source_message: None,
            source_contact_name: None,
        }
    }
}

/// Result of an upsert: the final row plus whether it was created.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub lead: Lead,
    pub created: bool,
}

/// Conjunctive filters for listing leads.
#[derive(Debug, Clone, Default)]
pub struct ListLeadsFilter {
    pub status: Option<LeadStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Case-insensitive substring match over display name, phone and last message
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Default page size for lead listings.
pub const DEFAULT_LIST_LIMIT: u64 = 50;

/// Aggregate pipeline statistics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct LeadStats {
    pub total: u64,
    pub new: u64,
    pub potential: u64,
    pub won: u64,
    pub lost: u64,
    pub won_value_sum: f64,
    pub won_value_avg: f64,
}

/// Persistence contract consumed by the ingestion pipeline and the API.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Exact-match lookup by the chat transport's message id.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Lead>, StoreError>;

    /// Exact-match lookup by normalized phone.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, StoreError>;

    /// Create-or-update keyed by phone, atomic with respect to the unique
    /// constraint; concurrent upserts for the same phone serialize to a
    /// single final row.
    async fn upsert_by_phone(&self, upsert: LeadUpsert) -> Result<UpsertOutcome, StoreError>;

    /// Explicit pipeline action; returns `None` when the id is unknown.
    async fn update_status(&self, id: Uuid, status: LeadStatus)
    -> Result<Option<Lead>, StoreError>;

    /// Explicit pipeline action; returns `None` when the id is unknown.
    async fn update_value(&self, id: Uuid, value: f64) -> Result<Option<Lead>, StoreError>;

    /// Returns the deleted lead, or `None` when the id is unknown.
    async fn delete(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// Filtered listing, ordered most-recently-updated first.
    async fn list(&self, filter: ListLeadsFilter) -> Result<Vec<Lead>, StoreError>;

    /// Per-status counts plus sum/avg value of won leads.
    async fn stats(&self) -> Result<LeadStats, StoreError>;
}

/// Authoritative phone validation: 8 to 15 digits.
///
/// The normalizer's country-code heuristic is best-effort; this check is
/// the final gate before persistence.
pub fn validate_phone(phone: &str) -> Result<(), StoreError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 8 || digits > 15 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::Validation(format!(
            "phone must contain 8 to 15 digits, got '{phone}'"
        )));
    }
    Ok(())
}

/// Deal values are non-negative.
pub fn validate_value(value: f64) -> Result<(), StoreError> {
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::Validation(format!(
            "value must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}
