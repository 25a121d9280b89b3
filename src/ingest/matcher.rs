//! Lead matching for normalized events.
//!
//! External-id lookup wins because it is immune to phone-normalization
//! drift; phone lookup is the fallback for events without a reliable
//! transport id (manually entered leads in particular).

use crate::models::lead::Lead;
use crate::store::{LeadStore, StoreError};

use super::normalizer::MessageEvent;

/// Find the lead an event belongs to, if any.
pub async fn find_existing(
    store: &dyn LeadStore,
    event: &MessageEvent,
) -> Result<Option<Lead>, StoreError> {
    if !event.external_id.is_empty() {
        if let Some(lead) = store.find_by_external_id(&event.external_id).await? {
            return Ok(Some(lead));
        }
    }

    store.find_by_phone(&event.phone).await
}

/// Same lookup order for the enriched contact-resolution path, which may
/// carry an external id, a phone, or both.
pub async fn find_by_keys(
    store: &dyn LeadStore,
    external_id: Option<&str>,
    phone: &str,
) -> Result<Option<Lead>, StoreError> {
    if let Some(external_id) = external_id.filter(|id| !id.is_empty()) {
        if let Some(lead) = store.find_by_external_id(external_id).await? {
            return Ok(Some(lead));
        }
    }

    store.find_by_phone(phone).await
}
