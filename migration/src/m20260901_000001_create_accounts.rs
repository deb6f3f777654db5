use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Accounts as seen by the engine's account-lookup collaborator
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(pk_uuid(Accounts::Id))
                    .col(string_null(Accounts::Email).unique_key())
                    .col(string_null(Accounts::ProcessorCustomerId))
                    .col(
                        timestamp_with_time_zone(Accounts::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Renewal events are resolved by customer id
        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_processor_customer_id")
                    .table(Accounts::Table)
                    .col(Accounts::ProcessorCustomerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
    Email,
    ProcessorCustomerId,
    CreatedAt,
}
