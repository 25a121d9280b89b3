//! # Message Ingestion Pipeline
//!
//! Wires the normalization, dedup, matching and upsert-resolution stages
//! together: raw event → normalize → dedup gate → match → merge → store →
//! notify. A fast preview is emitted before the authoritative resolution
//! completes; the resolved emission supersedes it.
//!
//! Every stage failure is isolated to its event: the pipeline logs, drops
//! and keeps serving subsequent events.

pub mod classify;
pub mod dedup;
pub mod matcher;
pub mod normalizer;
pub mod resolver;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::counter;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::models::lead::Lead;
use crate::notify::{MessagePreview, Notifier};
use crate::store::LeadStore;

use classify::Classifier;
use dedup::DedupGate;
use normalizer::RawChatEvent;

/// Late contact-name resolution pushed by the transport bridge after the
/// fast path already ran with a placeholder name.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ContactResolution {
    /// Counterpart address or phone in any transport form
    #[schema(example = "994501112233@c.us")]
    pub phone: String,
    /// Transport message id the resolution belongs to, when known
    pub external_id: Option<String>,
    /// Resolved contact name
    #[schema(example = "Ali")]
    pub display_name: String,
}

/// Terminal state of one event's trip through the pipeline.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Persisted and broadcast to observers
    Resolved { lead: Lead, created: bool },
    /// Filtered at the normalization boundary
    DroppedInvalid,
    /// Suppressed by the dedup gate
    DroppedDuplicate,
    /// Store failure; logged, no retry
    DroppedPersistence,
}

/// Terminal state of a contact-resolution push.
#[derive(Debug, Clone)]
pub enum ContactOutcome {
    /// Name applied and broadcast
    Updated(Lead),
    /// Redundant or unusable resolution; no write, no emit
    Skipped,
    /// No lead matches the resolution keys
    NotFound,
    /// Store failure; logged, no retry
    DroppedPersistence,
}

/// The ingestion pipeline. Cheap to share behind an `Arc`; all state is
/// internally synchronized.
pub struct IngestPipeline {
    store: Arc<dyn LeadStore>,
    notifier: Notifier,
    dedup: Arc<DedupGate>,
    classifier: Classifier,
    country_code: String,
    // One async mutex per phone: events for one phone apply in acceptance
    // order, events for different phones never contend.
    phone_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn LeadStore>,
        notifier: Notifier,
        dedup: Arc<DedupGate>,
        classifier: Classifier,
        country_code: String,
    ) -> Self {
        Self {
            store,
            notifier,
            dedup,
            classifier,
            country_code,
            phone_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dedup_gate(&self) -> &Arc<DedupGate> {
        &self.dedup
    }

    /// Process one raw chat event end to end.
    pub async fn handle_event(&self, raw: RawChatEvent) -> IngestOutcome {
        counter!("leadflow_ingest_events_total").increment(1);

        let event = match normalizer::normalize(&raw, &self.country_code) {
            Ok(event) => event,
            Err(reason) => {
                tracing::debug!(message_id = %raw.message_id, %reason, "dropping invalid event");
                counter!("leadflow_ingest_dropped_total", "reason" => "invalid").increment(1);
                return IngestOutcome::DroppedInvalid;
            }
        };

        if !self.dedup.observe(&event.external_id) {
            tracing::trace!(external_id = %event.external_id, "duplicate delivery suppressed");
            counter!("leadflow_ingest_dropped_total", "reason" => "duplicate").increment(1);
            return IngestOutcome::DroppedDuplicate;
        }

        // Fast path: sub-second dashboard feedback with a provisional
        // payload. The authoritative resolution below supersedes it.
        self.notifier.emit_preview(MessagePreview {
            phone: event.phone.clone(),
            display_name: event
                .display_name_hint
                .clone()
                .unwrap_or_else(|| resolver::placeholder_name(&event.phone)),
            body: event.body.clone(),
            direction: event.direction,
        });

        let lock = self.phone_lock(&event.phone);
        let _guard = lock.lock().await;

        let existing = match matcher::find_existing(self.store.as_ref(), &event).await {
            Ok(existing) => existing,
            Err(err) => {
                tracing::error!(
                    external_id = %event.external_id,
                    phone = %event.phone,
                    error = %err,
                    "lead lookup failed, dropping event"
                );
                counter!("leadflow_ingest_dropped_total", "reason" => "persistence").increment(1);
                return IngestOutcome::DroppedPersistence;
            }
        };

        // Under normalization drift the external-id match wins, so the
        // upsert must target the matched row's phone.
        let target_phone = existing
            .as_ref()
            .map(|lead| lead.phone.clone())
            .unwrap_or_else(|| event.phone.clone());

        let upsert = resolver::resolve_message(&event, &target_phone);

        let outcome = match self.store.upsert_by_phone(upsert).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    external_id = %event.external_id,
                    phone = %target_phone,
                    error = %err,
                    "lead upsert failed, dropping event"
                );
                counter!("leadflow_ingest_dropped_total", "reason" => "persistence").increment(1);
                return IngestOutcome::DroppedPersistence;
            }
        };

        let mut lead = outcome.lead;

        // Creation-time classification is an explicit pipeline action on
        // top of the merge; the merge itself never touches status.
        if outcome.created {
            counter!("leadflow_leads_created_total").increment(1);
            if let Some(status) = self.classifier.classify(&event.body) {
                match self.store.update_status(lead.id, status).await {
                    Ok(Some(classified)) => {
                        tracing::info!(lead_id = %classified.id, status = %status, "classified new lead");
                        lead = classified;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(lead_id = %lead.id, error = %err, "classification update failed");
                    }
                }
            }
        }

        self.notifier.emit_resolved(&lead, &event);
        counter!("leadflow_ingest_resolved_total").increment(1);

        IngestOutcome::Resolved {
            lead,
            created: outcome.created,
        }
    }

    /// Apply a late contact-name resolution; re-runs the update with only
    /// the name changed and skips redundant writes entirely.
    pub async fn handle_contact_resolved(&self, resolution: ContactResolution) -> ContactOutcome {
        let Some(phone) = normalizer::normalize_phone(&resolution.phone, &self.country_code) else {
            tracing::debug!(raw = %resolution.phone, "contact resolution with unusable phone");
            return ContactOutcome::Skipped;
        };

        let lock = self.phone_lock(&phone);
        let _guard = lock.lock().await;

        let existing = match matcher::find_by_keys(
            self.store.as_ref(),
            resolution.external_id.as_deref(),
            &phone,
        )
        .await
        {
            Ok(existing) => existing,
            Err(err) => {
                tracing::error!(phone = %phone, error = %err, "lead lookup failed for contact resolution");
                return ContactOutcome::DroppedPersistence;
            }
        };

        let Some(lead) = existing else {
            tracing::debug!(phone = %phone, "contact resolution for unknown lead");
            return ContactOutcome::NotFound;
        };

        let Some(upsert) = resolver::resolve_name_update(&lead, &resolution.display_name) else {
            tracing::trace!(lead_id = %lead.id, "redundant contact resolution skipped");
            return ContactOutcome::Skipped;
        };

        match self.store.upsert_by_phone(upsert).await {
            Ok(outcome) => {
                self.notifier.emit_lead_updated(&outcome.lead);
                counter!("leadflow_contact_resolutions_total").increment(1);
                ContactOutcome::Updated(outcome.lead)
            }
            Err(err) => {
                tracing::error!(lead_id = %lead.id, error = %err, "name update failed");
                ContactOutcome::DroppedPersistence
            }
        }
    }

    fn phone_lock(&self, phone: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.phone_locks.lock().expect("phone lock map poisoned");
        Arc::clone(
            locks
                .entry(phone.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
