//! Upsert resolution: the pure merge policy between an incoming event and
//! the lead of record.
//!
//! The policy is a function of (existing, event) state rather than an
//! append, which is what makes replaying an event past the dedup gate
//! harmless: the second application produces the same field set.

use crate::models::lead::{Lead, LeadSource, LeadStatus};
use crate::store::LeadUpsert;

use super::normalizer::MessageEvent;

/// Name shown for a lead before the transport resolves the real contact
/// name; derived from the phone so the dashboard has something stable.
pub fn placeholder_name(phone: &str) -> String {
    format!("~{phone}")
}

/// Build the upsert for a message event.
///
/// `target_phone` is the phone of the matched lead when one exists (it may
/// differ from the event's own phone under normalization drift, in which
/// case the external-id match wins), or the event phone for a fresh lead.
/// Status is intentionally absent from the update set: only the
/// `initial_status` on CREATE is ever supplied, so ingestion can never
/// reclassify an existing lead.
pub fn resolve_message(event: &MessageEvent, target_phone: &str) -> LeadUpsert {
    LeadUpsert {
        phone: target_phone.to_string(),
        external_id: Some(event.external_id.clone()).filter(|id| !id.is_empty()),
        display_name: event.display_name_hint.clone(),
        last_message: Some(event.body.clone()),
        value: None,
        product_name: None,
        initial_status: LeadStatus::New,
        source: LeadSource::Whatsapp,
        source_message: Some(event.body.clone()),
        source_contact_name: event.display_name_hint.clone(),
    }
}

/// Build the name-only upsert for the enriched contact-resolution path.
///
/// Returns `None` when the write would be redundant: the resolved name is
/// blank, matches what the lead already shows, or is just the
/// placeholder-derived guess again. Skipping here is what keeps the
/// notifier at exactly one resolved emission per real change.
pub fn resolve_name_update(lead: &Lead, resolved_name: &str) -> Option<LeadUpsert> {
    let resolved = resolved_name.trim();
    if resolved.is_empty() {
        return None;
    }

    if resolved == placeholder_name(&lead.phone) {
        return None;
    }

    if lead.display_name.as_deref() == Some(resolved) {
        return None;
    }

    let mut upsert = LeadUpsert::empty(lead.phone.clone());
    upsert.display_name = Some(resolved.to_string());
    Some(upsert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalizer::Direction;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(body: &str, hint: Option<&str>) -> MessageEvent {
        MessageEvent {
            external_id: "m1".to_string(),
            phone: "994501112233".to_string(),
            body: body.to_string(),
            direction: Direction::Inbound,
            display_name_hint: hint.map(str::to_string),
            observed_at: Utc::now(),
        }
    }

    fn lead_with_name(name: Option<&str>) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            phone: "994501112233".to_string(),
            external_id: Some("m1".to_string()),
            display_name: name.map(str::to_string),
            last_message: Some("hello".to_string()),
            source_message: Some("hello".to_string()),
            source_contact_name: None,
            status: LeadStatus::New,
            source: LeadSource::Whatsapp,
            value: 0.0,
            product_name: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn message_upsert_supplies_body_and_id_only() {
        let upsert = resolve_message(&event("Sifariş edirəm", None), "994501112233");

        assert_eq!(upsert.last_message.as_deref(), Some("Sifariş edirəm"));
        assert_eq!(upsert.external_id.as_deref(), Some("m1"));
        // Unsupplied fields stay None so the store merge preserves them.
        assert!(upsert.display_name.is_none());
        assert!(upsert.value.is_none());
        assert!(upsert.product_name.is_none());
    }

    #[test]
    fn message_upsert_targets_the_matched_phone() {
        let upsert = resolve_message(&event("hi", None), "994509998877");
        assert_eq!(upsert.phone, "994509998877");
    }

    #[test]
    fn name_update_applies_real_names() {
        let lead = lead_with_name(Some("~994501112233"));
        let upsert = resolve_name_update(&lead, "Ali").expect("real name should apply");

        assert_eq!(upsert.display_name.as_deref(), Some("Ali"));
        // Name-only update: nothing else is supplied.
        assert!(upsert.last_message.is_none());
        assert!(upsert.external_id.is_none());
    }

    #[test]
    fn name_update_skips_placeholder_guess() {
        let lead = lead_with_name(None);
        assert!(resolve_name_update(&lead, "~994501112233").is_none());
    }

    #[test]
    fn name_update_skips_unchanged_name() {
        let lead = lead_with_name(Some("Ali"));
        assert!(resolve_name_update(&lead, "Ali").is_none());
    }

    #[test]
    fn name_update_skips_blank_names() {
        let lead = lead_with_name(Some("Ali"));
        assert!(resolve_name_update(&lead, "  ").is_none());
    }
}
