//! Flat-file lead store.
//!
//! Persists the whole lead set as a single JSON document `{"leads": [...]}`,
//! rewritten wholesale on every mutation. All operations run behind one
//! async mutex, which also serializes concurrent upserts for the same
//! phone. A crash mid-write can corrupt the file; the database store is
//! the durable option.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::lead::{Lead, LeadStatus};

use super::{
    DEFAULT_LIST_LIMIT, LeadStats, LeadStore, LeadUpsert, ListLeadsFilter, StoreError,
    UpsertOutcome, validate_phone, validate_value,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDocument {
    leads: Vec<Lead>,
}

/// JSON-file-backed lead store.
pub struct FileLeadStore {
    path: PathBuf,
    state: Mutex<FileDocument>,
}

impl FileLeadStore {
    /// Open the store, loading an existing document when present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileDocument::default(),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(path = %path.display(), leads = document.leads.len(), "opened file lead store");

        Ok(Self {
            path,
            state: Mutex::new(document),
        })
    }

    async fn persist(&self, document: &FileDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for FileLeadStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Lead>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .leads
            .iter()
            .find(|lead| lead.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.leads.iter().find(|lead| lead.phone == phone).cloned())
    }

    async fn upsert_by_phone(&self, upsert: LeadUpsert) -> Result<UpsertOutcome, StoreError> {
        validate_phone(&upsert.phone)?;
        if let Some(value) = upsert.value {
            validate_value(value)?;
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();

        let outcome = match state.leads.iter_mut().find(|lead| lead.phone == upsert.phone) {
            Some(lead) => {
                if let Some(external_id) = upsert.external_id {
                    lead.external_id = Some(external_id);
                }
                if let Some(display_name) = upsert.display_name {
                    lead.display_name = Some(display_name);
                }
                if let Some(last_message) = upsert.last_message {
                    lead.last_message = Some(last_message);
                }
                if let Some(value) = upsert.value {
                    lead.value = value;
                }
                if let Some(product_name) = upsert.product_name {
                    lead.product_name = Some(product_name);
                }
                lead.updated_at = now.into();

                UpsertOutcome {
                    lead: lead.clone(),
                    created: false,
                }
            }
            None => {
                let lead = Lead {
                    id: Uuid::new_v4(),
                    phone: upsert.phone,
                    external_id: upsert.external_id,
                    display_name: upsert.display_name,
                    last_message: upsert.last_message,
                    source_message: upsert.source_message,
                    source_contact_name: upsert.source_contact_name,
                    status: upsert.initial_status,
                    source: upsert.source,
                    value: upsert.value.unwrap_or(0.0),
                    product_name: upsert.product_name,
                    created_at: now.into(),
                    updated_at: now.into(),
                };
                state.leads.push(lead.clone());
                UpsertOutcome {
                    lead,
                    created: true,
                }
            }
        };

        self.persist(&state).await?;
        Ok(outcome)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, StoreError> {
        let mut state = self.state.lock().await;

        let Some(lead) = state.leads.iter_mut().find(|lead| lead.id == id) else {
            return Ok(None);
        };

        lead.status = status;
        lead.updated_at = Utc::now().into();
        let updated = lead.clone();

        self.persist(&state).await?;
        Ok(Some(updated))
    }

    async fn update_value(&self, id: Uuid, value: f64) -> Result<Option<Lead>, StoreError> {
        validate_value(value)?;

        let mut state = self.state.lock().await;

        let Some(lead) = state.leads.iter_mut().find(|lead| lead.id == id) else {
            return Ok(None);
        };

        lead.value = value;
        lead.updated_at = Utc::now().into();
        let updated = lead.clone();

        self.persist(&state).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let mut state = self.state.lock().await;

        let Some(index) = state.leads.iter().position(|lead| lead.id == id) else {
            return Ok(None);
        };

        let removed = state.leads.remove(index);
        self.persist(&state).await?;
        Ok(Some(removed))
    }

    async fn list(&self, filter: ListLeadsFilter) -> Result<Vec<Lead>, StoreError> {
        let state = self.state.lock().await;

        let needle = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut matches: Vec<Lead> = state
            .leads
            .iter()
            .filter(|lead| {
                filter.status.is_none_or(|status| lead.status == status)
                    && filter
                        .start_date
                        .is_none_or(|start| lead.created_at >= start)
                    && filter.end_date.is_none_or(|end| lead.created_at <= end)
                    && needle.as_ref().is_none_or(|needle| {
                        lead.phone.contains(needle.as_str())
                            || lead
                                .display_name
                                .as_ref()
                                .is_some_and(|name| name.to_lowercase().contains(needle.as_str()))
                            || lead
                                .last_message
                                .as_ref()
                                .is_some_and(|msg| msg.to_lowercase().contains(needle.as_str()))
                    })
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
        });

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize;

        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn stats(&self) -> Result<LeadStats, StoreError> {
        let state = self.state.lock().await;

        let count = |status: LeadStatus| {
            state
                .leads
                .iter()
                .filter(|lead| lead.status == status)
                .count() as u64
        };

        let won_values: Vec<f64> = state
            .leads
            .iter()
            .filter(|lead| lead.status == LeadStatus::Won)
            .map(|lead| lead.value)
            .collect();

        let won_value_sum: f64 = won_values.iter().sum();
        let won_value_avg = if won_values.is_empty() {
            0.0
        } else {
            won_value_sum / won_values.len() as f64
        };

        Ok(LeadStats {
            total: state.leads.len() as u64,
            new: count(LeadStatus::New),
            potential: count(LeadStatus::Potential),
            won: count(LeadStatus::Won),
            lost: count(LeadStatus::Lost),
            won_value_sum,
            won_value_avg,
        })
    }
}
