use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per account; counters are only written under the per-account lock
        manager
            .create_table(
                Table::create()
                    .table(EntitlementAccounts::Table)
                    .if_not_exists()
                    .col(pk_uuid(EntitlementAccounts::AccountId))
                    .col(integer(EntitlementAccounts::FreeTurns).default(3).not_null())
                    .col(integer(EntitlementAccounts::PaidTurns).default(0).not_null())
                    .col(boolean(EntitlementAccounts::Unlimited).default(false).not_null())
                    .col(timestamp_with_time_zone_null(EntitlementAccounts::LastFreeReset))
                    .col(timestamp_with_time_zone_null(EntitlementAccounts::LastSyncedAt))
                    .col(
                        string(EntitlementAccounts::SubscriptionStatus)
                            .default("none")
                            .not_null(),
                    )
                    .col(big_integer(EntitlementAccounts::LedgerVersion).default(0).not_null())
                    .col(
                        timestamp_with_time_zone(EntitlementAccounts::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(EntitlementAccounts::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(EntitlementAccounts::FreeTurns).gte(0))
                    .check(Expr::col(EntitlementAccounts::PaidTurns).gte(0))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EntitlementAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EntitlementAccounts {
    Table,
    AccountId,
    FreeTurns,
    PaidTurns,
    Unlimited,
    LastFreeReset,
    LastSyncedAt,
    SubscriptionStatus,
    LedgerVersion,
    CreatedAt,
    UpdatedAt,
}
