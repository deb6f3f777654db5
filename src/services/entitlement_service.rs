use crate::{
    error::{ApiError, Result},
    models::{
        common::SubscriptionStatus,
        entitlement::{BalanceSnapshot, EntitlementState},
    },
};
use anyhow::anyhow;
use sea_orm::{
    entity::*, query::*, sea_query::OnConflict, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// An entitlement row held under `SELECT ... FOR UPDATE` for the life of a transaction.
///
/// Ledger and status operations mutate this in memory; nothing reaches the
/// database until [`EntitlementService::persist`] runs in the same transaction.
#[derive(Debug, Clone)]
pub struct LockedAccount {
    pub account_id: Uuid,
    pub state: EntitlementState,
    pub subscription_status: SubscriptionStatus,
    pub last_synced_at: Option<OffsetDateTime>,
    pub(crate) ledger_version: i64,
    row: entity::entitlement_accounts::Model,
}

impl LockedAccount {
    fn from_row(row: entity::entitlement_accounts::Model) -> Result<Self> {
        let subscription_status = SubscriptionStatus::from_str(&row.subscription_status)
            .ok_or_else(|| {
                ApiError::Internal(anyhow!(
                    "Unknown subscription status '{}' for account {}",
                    row.subscription_status,
                    row.account_id
                ))
            })?;

        Ok(Self {
            account_id: row.account_id,
            state: EntitlementState {
                free_turns: row.free_turns,
                paid_turns: row.paid_turns,
                unlimited: row.unlimited,
                last_free_reset: row.last_free_reset,
            },
            subscription_status,
            last_synced_at: row.last_synced_at,
            ledger_version: row.ledger_version,
            row,
        })
    }

    /// Sequence number the next ledger entry for this account will take
    pub fn next_sequence(&self) -> i64 {
        self.ledger_version + 1
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        self.state.snapshot()
    }
}

/// Storage for entitlement rows. Callers serialize through `AccountLocks` first.
pub struct EntitlementService {
    db: DatabaseConnection,
}

impl EntitlementService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the entitlement row with the monthly free allowance. Idempotent.
    #[instrument(skip(self))]
    pub async fn provision(&self, account_id: Uuid) -> Result<BalanceSnapshot> {
        let txn = self.db.begin().await?;
        let account = self
            .lock_in_txn(account_id, OffsetDateTime::now_utc(), &txn)
            .await?;
        txn.commit().await?;

        Ok(account.snapshot())
    }

    /// Find and lock the entitlement row, provisioning it on first sight
    #[instrument(skip(self, txn))]
    pub async fn lock_in_txn(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<LockedAccount> {
        let existing = entity::entitlement_accounts::Entity::find_by_id(account_id)
            .lock_exclusive()
            .one(txn)
            .await?;

        if let Some(row) = existing {
            return LockedAccount::from_row(row);
        }

        // Insert is a no-op if a concurrent transaction provisioned first
        let provisioned = EntitlementState::provisioned(now);
        let new_row = entity::entitlement_accounts::ActiveModel {
            account_id: Set(account_id),
            free_turns: Set(provisioned.free_turns),
            paid_turns: Set(provisioned.paid_turns),
            unlimited: Set(provisioned.unlimited),
            last_free_reset: Set(provisioned.last_free_reset),
            last_synced_at: Set(None),
            subscription_status: Set(SubscriptionStatus::None.as_str().to_string()),
            ledger_version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = entity::entitlement_accounts::Entity::insert(new_row)
            .on_conflict(
                OnConflict::column(entity::entitlement_accounts::Column::AccountId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;

        if inserted > 0 {
            info!(
                account_id = %account_id,
                free_turns = provisioned.free_turns,
                "Provisioned entitlement account"
            );
        }

        let row = entity::entitlement_accounts::Entity::find_by_id(account_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow!(
                    "Failed to create or lock entitlement account {}",
                    account_id
                ))
            })?;

        LockedAccount::from_row(row)
    }

    /// Write back counters, status and ledger version
    pub async fn persist(
        &self,
        account: &LockedAccount,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<()> {
        let mut active: entity::entitlement_accounts::ActiveModel = account.row.clone().into();

        active.free_turns = Set(account.state.free_turns);
        active.paid_turns = Set(account.state.paid_turns);
        active.unlimited = Set(account.state.unlimited);
        active.last_free_reset = Set(account.state.last_free_reset);
        active.last_synced_at = Set(account.last_synced_at);
        active.subscription_status = Set(account.subscription_status.as_str().to_string());
        active.ledger_version = Set(account.ledger_version);
        active.updated_at = Set(now);

        active.update(txn).await?;
        Ok(())
    }
}
