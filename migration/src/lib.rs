pub use sea_orm_migration::prelude::*;

mod m20260901_000001_create_accounts;
mod m20260901_000002_create_entitlement_accounts;
mod m20260901_000003_create_ledger_entries;
mod m20260915_000001_create_pending_checkouts;
mod m20260915_000002_create_subscription_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260901_000001_create_accounts::Migration),
            Box::new(m20260901_000002_create_entitlement_accounts::Migration),
            Box::new(m20260901_000003_create_ledger_entries::Migration),
            Box::new(m20260915_000001_create_pending_checkouts::Migration),
            Box::new(m20260915_000002_create_subscription_events::Migration),
        ]
    }
}
