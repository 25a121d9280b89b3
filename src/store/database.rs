//! SeaORM-backed lead store.
//!
//! The upsert runs inside a transaction: read the current row for the
//! phone, then insert or merge. When a concurrent event wins the insert
//! race the unique violation is caught and the upsert is retried once as
//! an update against the winner row, giving `ON CONFLICT (phone) DO
//! UPDATE` semantics without dialect-specific SQL.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::lead::{ActiveModel, Column, Entity as Leads, Lead, LeadStatus};

use super::{
    DEFAULT_LIST_LIMIT, LeadStats, LeadStore, LeadUpsert, ListLeadsFilter, StoreError,
    UpsertOutcome, validate_phone, validate_value,
};

/// Relational lead store.
#[derive(Clone)]
pub struct DatabaseLeadStore {
    db: DatabaseConnection,
}

impl DatabaseLeadStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn apply_upsert(&self, upsert: &LeadUpsert) -> Result<UpsertOutcome, StoreError> {
        let txn = self.db.begin().await?;

        let existing = Leads::find()
            .filter(Column::Phone.eq(upsert.phone.as_str()))
            .one(&txn)
            .await?;

        let outcome = match existing {
            Some(current) => {
                let mut active: ActiveModel = current.into();
                if let Some(ref external_id) = upsert.external_id {
                    active.external_id = Set(Some(external_id.clone()));
                }
                if let Some(ref display_name) = upsert.display_name {
                    active.display_name = Set(Some(display_name.clone()));
                }
                if let Some(ref last_message) = upsert.last_message {
                    active.last_message = Set(Some(last_message.clone()));
                }
                if let Some(value) = upsert.value {
                    active.value = Set(value);
                }
                if let Some(ref product_name) = upsert.product_name {
                    active.product_name = Set(Some(product_name.clone()));
                }
                active.updated_at = Set(Utc::now().into());

                let lead = active.update(&txn).await?;
                UpsertOutcome {
                    lead,
                    created: false,
                }
            }
            None => {
                let now = Utc::now();
                let lead = ActiveModel {
                    id: Set(Uuid::new_v4()),
                    phone: Set(upsert.phone.clone()),
                    external_id: Set(upsert.external_id.clone()),
                    display_name: Set(upsert.display_name.clone()),
                    last_message: Set(upsert.last_message.clone()),
                    source_message: Set(upsert.source_message.clone()),
                    source_contact_name: Set(upsert.source_contact_name.clone()),
                    status: Set(upsert.initial_status),
                    source: Set(upsert.source),
                    value: Set(upsert.value.unwrap_or(0.0)),
                    product_name: Set(upsert.product_name.clone()),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(&txn)
                .await?;
                UpsertOutcome {
                    lead,
                    created: true,
                }
            }
        };

        txn.commit().await?;
        Ok(outcome)
    }
}

#[derive(Debug, FromQueryResult)]
struct WonAggregate {
    value_sum: Option<f64>,
    value_avg: Option<f64>,
}

#[async_trait]
impl LeadStore for DatabaseLeadStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Lead>, StoreError> {
        let lead = Leads::find()
            .filter(Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;
        Ok(lead)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, StoreError> {
        let lead = Leads::find()
            .filter(Column::Phone.eq(phone))
            .one(&self.db)
            .await?;
        Ok(lead)
    }

    async fn upsert_by_phone(&self, upsert: LeadUpsert) -> Result<UpsertOutcome, StoreError> {
        validate_phone(&upsert.phone)?;
        if let Some(value) = upsert.value {
            validate_value(value)?;
        }

        match self.apply_upsert(&upsert).await {
            Err(StoreError::Database(err)) if is_unique_violation(&err) => {
                // A concurrent event created this phone between our read and
                // insert; the retry sees the winner row and merges into it.
                tracing::debug!(
                    phone = %upsert.phone,
                    "insert lost a concurrent create, retrying as update"
                );
                self.apply_upsert(&upsert).await
            }
            other => other,
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, StoreError> {
        let Some(current) = Leads::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now().into());

        Ok(Some(active.update(&self.db).await?))
    }

    async fn update_value(&self, id: Uuid, value: f64) -> Result<Option<Lead>, StoreError> {
        validate_value(value)?;

        let Some(current) = Leads::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: ActiveModel = current.into();
        active.value = Set(value);
        active.updated_at = Set(Utc::now().into());

        Ok(Some(active.update(&self.db).await?))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let Some(current) = Leads::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        current.clone().delete(&self.db).await?;
        Ok(Some(current))
    }

    async fn list(&self, filter: ListLeadsFilter) -> Result<Vec<Lead>, StoreError> {
        let mut query = Leads::find();

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }

        if let Some(start) = filter.start_date {
            query = query.filter(Column::CreatedAt.gte(start));
        }

        if let Some(end) = filter.end_date {
            query = query.filter(Column::CreatedAt.lte(end));
        }

        if let Some(ref search) = filter.search {
            let needle = format!("%{}%", search.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((Leads, Column::DisplayName))))
                            .like(needle.clone()),
                    )
                    .add(Expr::col((Leads, Column::Phone)).like(needle.clone()))
                    .add(
                        Expr::expr(Func::lower(Expr::col((Leads, Column::LastMessage))))
                            .like(needle),
                    ),
            );
        }

        let leads = query
            .order_by_desc(Column::UpdatedAt)
            .order_by_desc(Column::CreatedAt)
            .limit(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .offset(filter.offset.unwrap_or(0))
            .all(&self.db)
            .await?;

        Ok(leads)
    }

    async fn stats(&self) -> Result<LeadStats, StoreError> {
        let total = Leads::find().count(&self.db).await?;

        let mut by_status = [0u64; 4];
        for (slot, status) in by_status.iter_mut().zip([
            LeadStatus::New,
            LeadStatus::Potential,
            LeadStatus::Won,
            LeadStatus::Lost,
        ]) {
            *slot = Leads::find()
                .filter(Column::Status.eq(status))
                .count(&self.db)
                .await?;
        }

        let won_aggregate = Leads::find()
            .select_only()
            .column_as(Expr::expr(Func::sum(Expr::col(Column::Value))), "value_sum")
            .column_as(Expr::expr(Func::avg(Expr::col(Column::Value))), "value_avg")
            .filter(Column::Status.eq(LeadStatus::Won))
            .into_model::<WonAggregate>()
            .one(&self.db)
            .await?;

        let (won_value_sum, won_value_avg) = won_aggregate
            .map(|agg| {
                (
                    agg.value_sum.unwrap_or(0.0),
                    agg.value_avg.unwrap_or(0.0),
                )
            })
            .unwrap_or((0.0, 0.0));

        Ok(LeadStats {
            total,
            new: by_status[0],
            potential: by_status[1],
            won: by_status[2],
            lost: by_status[3],
            won_value_sum,
            won_value_avg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lead::LeadSource;
    use migration::MigratorTrait;
    use sea_orm::{ConnectOptions, Database};

    async fn setup_store() -> DatabaseLeadStore {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        // In-memory SQLite needs a single connection or each pooled
        // connection sees its own empty database.
        opt.max_connections(1).sqlx_logging(false);

        let db = Database::connect(opt).await.expect("sqlite should connect");
        migration::Migrator::up(&db, None)
            .await
            .expect("migrations should apply");
        DatabaseLeadStore::new(db)
    }

    fn message_upsert(phone: &str, external_id: &str, body: &str) -> LeadUpsert {
        LeadUpsert {
            phone: phone.to_string(),
            external_id: Some(external_id.to_string()),
            display_name: None,
            last_message: Some(body.to_string()),
            value: None,
            product_name: None,
            initial_status: LeadStatus::New,
            source: LeadSource::Whatsapp,
            source_message: Some(body.to_string()),
            source_contact_name: None,
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_single_row() {
        let store = setup_store().await;

        let created = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "Salam, qiymət?"))
            .await
            .unwrap();
        assert!(created.created);
        assert_eq!(created.lead.status, LeadStatus::New);
        assert_eq!(
            created.lead.last_message.as_deref(),
            Some("Salam, qiymət?")
        );

        let updated = store
            .upsert_by_phone(message_upsert("994501112233", "m2", "Sifariş edirəm"))
            .await
            .unwrap();
        assert!(!updated.created);
        assert_eq!(updated.lead.id, created.lead.id);
        assert_eq!(updated.lead.external_id.as_deref(), Some("m2"));
        assert_eq!(
            updated.lead.last_message.as_deref(),
            Some("Sifariş edirəm")
        );
        // First-contact fields stay frozen.
        assert_eq!(
            updated.lead.source_message.as_deref(),
            Some("Salam, qiymət?")
        );
        assert_eq!(updated.lead.created_at, created.lead.created_at);

        let all = store.list(ListLeadsFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn upsert_preserves_unsupplied_fields() {
        let store = setup_store().await;

        let mut first = message_upsert("994501112233", "m1", "hello");
        first.display_name = Some("Ali".to_string());
        store.upsert_by_phone(first).await.unwrap();

        // Second event carries only a body; name must survive.
        let updated = store
            .upsert_by_phone(message_upsert("994501112233", "m2", "again"))
            .await
            .unwrap();
        assert_eq!(updated.lead.display_name.as_deref(), Some("Ali"));
    }

    #[tokio::test]
    async fn upsert_never_touches_status_of_existing_row() {
        let store = setup_store().await;

        let created = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "hello"))
            .await
            .unwrap();

        store
            .update_status(created.lead.id, LeadStatus::Lost)
            .await
            .unwrap()
            .expect("lead exists");

        let updated = store
            .upsert_by_phone(message_upsert("994501112233", "m2", "still there?"))
            .await
            .unwrap();
        assert_eq!(updated.lead.status, LeadStatus::Lost);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_repeated_events() {
        let store = setup_store().await;

        let first = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "hello"))
            .await
            .unwrap();
        let second = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "hello"))
            .await
            .unwrap();

        assert_eq!(first.lead.id, second.lead.id);
        assert_eq!(first.lead.external_id, second.lead.external_id);
        assert_eq!(first.lead.last_message, second.lead.last_message);
        assert_eq!(first.lead.status, second.lead.status);
        assert_eq!(first.lead.source_message, second.lead.source_message);
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_phone() {
        let store = setup_store().await;

        let result = store
            .upsert_by_phone(message_upsert("1234", "m1", "hello"))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn mutations_return_none_for_unknown_id() {
        let store = setup_store().await;
        let missing = Uuid::new_v4();

        assert!(store
            .update_status(missing, LeadStatus::Won)
            .await
            .unwrap()
            .is_none());
        assert!(store.update_value(missing, 10.0).await.unwrap().is_none());
        assert!(store.delete(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_returns_the_removed_lead() {
        let store = setup_store().await;

        let created = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "hello"))
            .await
            .unwrap();

        let deleted = store
            .delete(created.lead.id)
            .await
            .unwrap()
            .expect("lead exists");
        assert_eq!(deleted.id, created.lead.id);

        assert!(store
            .find_by_phone("994501112233")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_applies_conjunctive_filters() {
        let store = setup_store().await;

        store
            .upsert_by_phone(message_upsert("994501112233", "m1", "price question"))
            .await
            .unwrap();
        let second = store
            .upsert_by_phone(message_upsert("994502223344", "m2", "order placed"))
            .await
            .unwrap();
        store
            .update_status(second.lead.id, LeadStatus::Won)
            .await
            .unwrap();

        let won_only = store
            .list(ListLeadsFilter {
                status: Some(LeadStatus::Won),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(won_only.len(), 1);
        assert_eq!(won_only[0].phone, "994502223344");

        let by_search = store
            .list(ListLeadsFilter {
                search: Some("PRICE".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1);
        assert_eq!(by_search[0].phone, "994501112233");

        let none = store
            .list(ListLeadsFilter {
                status: Some(LeadStatus::Won),
                search: Some("price".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn stats_aggregate_won_values() {
        let store = setup_store().await;

        let a = store
            .upsert_by_phone(message_upsert("994501112233", "m1", "a"))
            .await
            .unwrap();
        let b = store
            .upsert_by_phone(message_upsert("994502223344", "m2", "b"))
            .await
            .unwrap();
        store
            .upsert_by_phone(message_upsert("994503334455", "m3", "c"))
            .await
            .unwrap();

        store.update_status(a.lead.id, LeadStatus::Won).await.unwrap();
        store.update_value(a.lead.id, 100.0).await.unwrap();
        store.update_status(b.lead.id, LeadStatus::Won).await.unwrap();
        store.update_value(b.lead.id, 50.0).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.won, 2);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.won_value_sum, 150.0);
        assert_eq!(stats.won_value_avg, 75.0);
    }
}
