use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only record of every balance-affecting event
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(pk_uuid(LedgerEntries::Id))
                    .col(uuid(LedgerEntries::AccountId).not_null())
                    .col(big_integer(LedgerEntries::Sequence).not_null())
                    .col(string(LedgerEntries::Kind).not_null())
                    .col(string(LedgerEntries::Source).not_null())
                    .col(string_null(LedgerEntries::ExternalId))
                    .col(integer(LedgerEntries::Amount).not_null())
                    .col(integer(LedgerEntries::BalanceBefore).not_null())
                    .col(integer(LedgerEntries::BalanceAfter).not_null())
                    .col(json_null(LedgerEntries::Context))
                    .col(
                        timestamp_with_time_zone(LedgerEntries::OccurredAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Idempotency key: NULL external ids never collide
        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_entries_source_external_id")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::Source)
                    .col(LedgerEntries::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // History reads and per-account ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_entries_account_sequence")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::AccountId)
                    .col(LedgerEntries::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LedgerEntries {
    Table,
    Id,
    AccountId,
    Sequence,
    Kind,
    Source,
    ExternalId,
    Amount,
    BalanceBefore,
    BalanceAfter,
    Context,
    OccurredAt,
}
