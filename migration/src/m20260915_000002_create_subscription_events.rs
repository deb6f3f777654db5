use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Lifecycle audit trail, separate from turn credits
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionEvents::Table)
                    .if_not_exists()
                    .col(pk_uuid(SubscriptionEvents::Id))
                    .col(uuid_null(SubscriptionEvents::AccountId))
                    .col(string(SubscriptionEvents::EventName).not_null())
                    .col(string(SubscriptionEvents::ExternalId).not_null())
                    .col(boolean(SubscriptionEvents::TestMode).default(false).not_null())
                    .col(string_null(SubscriptionEvents::ResolutionStrategy))
                    .col(string_null(SubscriptionEvents::FromStatus))
                    .col(string_null(SubscriptionEvents::ToStatus))
                    .col(string(SubscriptionEvents::Outcome).not_null())
                    .col(json_null(SubscriptionEvents::Detail))
                    .col(string(SubscriptionEvents::PayloadSha256).not_null())
                    .col(
                        timestamp_with_time_zone(SubscriptionEvents::ReceivedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_events_account_id")
                    .table(SubscriptionEvents::Table)
                    .col(SubscriptionEvents::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_events_outcome")
                    .table(SubscriptionEvents::Table)
                    .col(SubscriptionEvents::Outcome)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionEvents {
    Table,
    Id,
    AccountId,
    EventName,
    ExternalId,
    TestMode,
    ResolutionStrategy,
    FromStatus,
    ToStatus,
    Outcome,
    Detail,
    PayloadSha256,
    ReceivedAt,
}
