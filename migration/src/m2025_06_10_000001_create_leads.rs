//! Migration to create the leads table.
//!
//! Leads are keyed by a system-generated UUID; the business key is the
//! normalized phone number, unique across non-deleted rows. The chat
//! transport's message id is tracked as an optional secondary unique key.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Leads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Leads::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Leads::Phone)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Leads::ExternalId).text().null())
                    .col(ColumnDef::new(Leads::DisplayName).text().null())
                    .col(ColumnDef::new(Leads::LastMessage).text().null())
                    .col(ColumnDef::new(Leads::SourceMessage).text().null())
                    .col(ColumnDef::new(Leads::SourceContactName).text().null())
                    .col(
                        ColumnDef::new(Leads::Status)
                            .text()
                            .not_null()
                            .default("new"),
                    )
                    .col(
                        ColumnDef::new(Leads::Source)
                            .text()
                            .not_null()
                            .default("whatsapp"),
                    )
                    .col(
                        ColumnDef::new(Leads::Value)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Leads::ProductName).text().null())
                    .col(
                        ColumnDef::new(Leads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Leads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // external_id is unique only when present; a partial index keeps
        // multiple NULLs legal on both Postgres and SQLite.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_external_id ON leads (external_id) WHERE external_id IS NOT NULL".to_string(),
            ))
            .await?;

        // Default list ordering is most-recently-updated first.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_leads_updated_at ON leads (updated_at DESC)"
                    .to_string(),
            ))
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_leads_status ON leads (status)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Leads::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
    Phone,
    ExternalId,
    DisplayName,
    LastMessage,
    SourceMessage,
    SourceContactName,
    Status,
    Source,
    Value,
    ProductName,
    CreatedAt,
    UpdatedAt,
}
