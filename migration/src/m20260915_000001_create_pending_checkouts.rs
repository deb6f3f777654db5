use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PendingCheckouts::Table)
                    .if_not_exists()
                    .col(pk_uuid(PendingCheckouts::Id))
                    .col(uuid(PendingCheckouts::AccountId).not_null())
                    .col(string_null(PendingCheckouts::CheckoutId))
                    .col(string(PendingCheckouts::ProductVariant).not_null())
                    .col(string(PendingCheckouts::AccountEmailSnapshot).not_null())
                    .col(string(PendingCheckouts::Status).default("pending").not_null())
                    .col(string_null(PendingCheckouts::ProcessorCustomerId))
                    .col(string_null(PendingCheckouts::ResolvedEventId))
                    .col(
                        timestamp_with_time_zone(PendingCheckouts::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone(PendingCheckouts::ExpiresAt).not_null())
                    .col(timestamp_with_time_zone_null(PendingCheckouts::CompletedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pending_checkouts_account_id")
                    .table(PendingCheckouts::Table)
                    .col(PendingCheckouts::AccountId)
                    .to_owned(),
            )
            .await?;

        // Resolver lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_pending_checkouts_customer_status")
                    .table(PendingCheckouts::Table)
                    .col(PendingCheckouts::ProcessorCustomerId)
                    .col(PendingCheckouts::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pending_checkouts_email_status")
                    .table(PendingCheckouts::Table)
                    .col(PendingCheckouts::AccountEmailSnapshot)
                    .col(PendingCheckouts::Status)
                    .to_owned(),
            )
            .await?;

        // Expiry sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_pending_checkouts_status_expires_at")
                    .table(PendingCheckouts::Table)
                    .col(PendingCheckouts::Status)
                    .col(PendingCheckouts::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PendingCheckouts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PendingCheckouts {
    Table,
    Id,
    AccountId,
    CheckoutId,
    ProductVariant,
    AccountEmailSnapshot,
    Status,
    ProcessorCustomerId,
    ResolvedEventId,
    CreatedAt,
    ExpiresAt,
    CompletedAt,
}
