//! Lead entity model
//!
//! This module contains the SeaORM entity model for the leads table,
//! the aggregate of record for the sales pipeline. A lead is keyed by
//! its normalized phone number; the chat transport's most recent
//! message id is kept as an optional secondary unique key.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lead entity representing one prospective customer per phone number
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    /// Unique identifier for the lead (primary key, immutable)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Normalized phone number, the unique business key
    #[sea_orm(unique)]
    pub phone: String,

    /// Most recent chat-transport message id associated with this lead
    pub external_id: Option<String>,

    /// Contact display name, improved as the transport resolves it
    pub display_name: Option<String>,

    /// Latest inbound or outbound message body
    pub last_message: Option<String>,

    /// The very first message that created the lead (immutable once set)
    pub source_message: Option<String>,

    /// The contact name observed at creation time (immutable once set)
    pub source_contact_name: Option<String>,

    /// Pipeline status; never modified by the message-ingestion path
    pub status: LeadStatus,

    /// Where the lead originated
    pub source: LeadSource,

    /// Estimated or closed deal value, non-negative
    pub value: f64,

    /// Product the lead is interested in
    pub product_name: Option<String>,

    /// Set once at first persistence
    pub created_at: DateTimeWithTimeZone,

    /// Bumped on every mutation
    pub updated_at: DateTimeWithTimeZone,
}

/// Convenience alias used outside the persistence layer.
pub type Lead = Model;

/// Sales pipeline status for a lead
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum LeadStatus {
    #[sea_orm(string_value = "new")]
    #[serde(rename = "new")]
    #[default]
    New,

    #[sea_orm(string_value = "potential")]
    #[serde(rename = "potential")]
    Potential,

    #[sea_orm(string_value = "won")]
    #[serde(rename = "won")]
    Won,

    #[sea_orm(string_value = "lost")]
    #[serde(rename = "lost")]
    Lost,
}

impl LeadStatus {
    /// Return the canonical string representation for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Potential => "potential",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = UnknownLeadStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "potential" => Ok(LeadStatus::Potential),
            "won" => Ok(LeadStatus::Won),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(UnknownLeadStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unknown lead status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lead status: {0}")]
pub struct UnknownLeadStatus(pub String);

/// Origin of a lead
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum LeadSource {
    #[sea_orm(string_value = "whatsapp")]
    #[serde(rename = "whatsapp")]
    #[default]
    Whatsapp,

    #[sea_orm(string_value = "manual")]
    #[serde(rename = "manual")]
    Manual,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Lead representation for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeadResponse {
    /// Unique identifier for the lead
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Normalized phone number
    #[schema(example = "994501112233")]
    pub phone: String,
    /// Most recent chat-transport message id
    pub external_id: Option<String>,
    /// Contact display name
    #[schema(example = "Ali")]
    pub display_name: Option<String>,
    /// Latest message body
    pub last_message: Option<String>,
    /// First message that created the lead
    pub source_message: Option<String>,
    /// Contact name observed at creation time
    pub source_contact_name: Option<String>,
    /// Pipeline status
    pub status: LeadStatus,
    /// Lead origin
    pub source: LeadSource,
    /// Deal value
    pub value: f64,
    /// Product of interest
    pub product_name: Option<String>,
    /// Creation timestamp (RFC 3339)
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub updated_at: String,
}

impl From<Model> for LeadResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            phone: model.phone,
            external_id: model.external_id,
            display_name: model.display_name,
            last_message: model.last_message,
            source_message: model.source_message,
            source_contact_name: model.source_contact_name,
            status: model.status,
            source: model.source,
            value: model.value,
            product_name: model.product_name,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}
