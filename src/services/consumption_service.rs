use crate::{
    error::Result,
    models::{
        consumption::{TurnConsumptionResult, UsageContext},
        entitlement::BalanceSnapshot,
    },
    services::{
        account_locks::AccountLocks, entitlement_service::EntitlementService,
        ledger_service::LedgerService,
    },
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Single entry point for spending turns.
///
/// Every check-and-debit runs under the account lock and a row lock, so
/// concurrent requests for one account observe each other's writes.
pub struct ConsumptionService {
    db: DatabaseConnection,
    locks: Arc<AccountLocks>,
    entitlements: Arc<EntitlementService>,
    ledger: Arc<LedgerService>,
}

impl ConsumptionService {
    pub fn new(
        db: DatabaseConnection,
        locks: Arc<AccountLocks>,
        entitlements: Arc<EntitlementService>,
        ledger: Arc<LedgerService>,
    ) -> Self {
        Self {
            db,
            locks,
            entitlements,
            ledger,
        }
    }

    /// Spend one turn, free before paid.
    ///
    /// Insufficient balance is a normal result with `success = false`; the
    /// refused attempt is still written to the ledger.
    #[instrument(skip(self, usage), fields(feature = %usage.feature))]
    pub async fn consume(
        &self,
        account_id: Uuid,
        usage: &UsageContext,
    ) -> Result<TurnConsumptionResult> {
        let _guard = self.locks.acquire(account_id).await?;
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let mut account = self.entitlements.lock_in_txn(account_id, now, &txn).await?;
        self.ledger
            .apply_monthly_reset_in_txn(&mut account, now, &txn)
            .await?;

        let before = account.state;
        let mut after = before;

        let result = match after.debit(1) {
            Ok(debit) => {
                let amount = after.total() - before.total();
                let context = json!({
                    "feature": usage.feature,
                    "requestId": usage.request_id,
                    "consumed": debit.kind.as_str(),
                });
                self.ledger
                    .append_debit_in_txn(
                        &mut account,
                        amount,
                        before.total(),
                        debit.balance_after,
                        context,
                        now,
                        &txn,
                    )
                    .await?;
                account.state = after;

                info!(
                    account_id = %account_id,
                    consumed = debit.kind.as_str(),
                    remaining = debit.balance_after,
                    "Turn consumed"
                );
                TurnConsumptionResult::from_state(&after, true, Some(debit.kind))
            }
            Err(insufficient) => {
                let context = json!({
                    "feature": usage.feature,
                    "requestId": usage.request_id,
                    "outcome": "insufficient_balance",
                });
                self.ledger
                    .append_debit_in_txn(
                        &mut account,
                        0,
                        before.total(),
                        before.total(),
                        context,
                        now,
                        &txn,
                    )
                    .await?;

                info!(
                    account_id = %account_id,
                    free_turns = insufficient.free_turns,
                    paid_turns = insufficient.paid_turns,
                    "Turn refused: insufficient balance"
                );
                TurnConsumptionResult::from_state(&before, false, None)
            }
        };

        self.entitlements.persist(&account, now, &txn).await?;
        txn.commit().await?;

        Ok(result)
    }

    /// Current balance, applying a due monthly reset first
    #[instrument(skip(self))]
    pub async fn get_balance(&self, account_id: Uuid) -> Result<BalanceSnapshot> {
        let _guard = self.locks.acquire(account_id).await?;
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let mut account = self.entitlements.lock_in_txn(account_id, now, &txn).await?;
        if self
            .ledger
            .apply_monthly_reset_in_txn(&mut account, now, &txn)
            .await?
        {
            self.entitlements.persist(&account, now, &txn).await?;
        }
        txn.commit().await?;

        Ok(account.snapshot())
    }
}
