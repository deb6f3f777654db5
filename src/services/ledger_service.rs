use crate::{
    error::{ApiError, Result},
    models::{
        common::{LedgerKind, LedgerSource},
        ledger::{CreditOutcome, HistoryFilter},
    },
    services::{
        account_locks::AccountLocks,
        entitlement_service::{EntitlementService, LockedAccount},
    },
};
use anyhow::anyhow;
use sea_orm::{
    entity::*, query::*, sea_query::OnConflict, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use serde_json::{json, Value};
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A ledger row about to be written
struct NewEntry<'a> {
    kind: LedgerKind,
    source: LedgerSource,
    external_id: Option<&'a str>,
    amount: i32,
    balance_before: i32,
    balance_after: i32,
    context: Value,
}

/// Append-only record of every balance change, keyed for idempotency by
/// `(source, external_id)`.
pub struct LedgerService {
    db: DatabaseConnection,
    locks: Arc<AccountLocks>,
    entitlements: Arc<EntitlementService>,
}

impl LedgerService {
    pub fn new(
        db: DatabaseConnection,
        locks: Arc<AccountLocks>,
        entitlements: Arc<EntitlementService>,
    ) -> Self {
        Self {
            db,
            locks,
            entitlements,
        }
    }

    /// Credit paid turns exactly once per `(source, external_id)`.
    ///
    /// A `None` external id always applies.
    #[instrument(skip(self, context))]
    pub async fn try_append_credit(
        &self,
        account_id: Uuid,
        source: LedgerSource,
        external_id: Option<&str>,
        turns: i32,
        context: Value,
    ) -> Result<CreditOutcome> {
        let _guard = self.locks.acquire(account_id).await?;
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let mut account = self.entitlements.lock_in_txn(account_id, now, &txn).await?;
        let outcome = self
            .try_append_credit_in_txn(&mut account, source, external_id, turns, context, now, &txn)
            .await?;

        if outcome.is_applied() {
            self.entitlements.persist(&account, now, &txn).await?;
        }
        txn.commit().await?;

        Ok(outcome)
    }

    /// Credit within an existing transaction. The caller holds the account
    /// lock and persists `account` afterwards.
    #[instrument(skip(self, account, context, txn), fields(account_id = %account.account_id))]
    #[allow(clippy::too_many_arguments)]
    pub async fn try_append_credit_in_txn(
        &self,
        account: &mut LockedAccount,
        source: LedgerSource,
        external_id: Option<&str>,
        turns: i32,
        context: Value,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<CreditOutcome> {
        if turns <= 0 {
            return Err(ApiError::BadRequest(format!(
                "Credit amount must be positive, got {}",
                turns
            )));
        }

        if let Some(external_id) = external_id {
            if let Some(existing) = self.find_in_txn(source, external_id, txn).await? {
                info!(
                    source = source.as_str(),
                    external_id,
                    entry_id = %existing.id,
                    "Credit already applied, skipping"
                );
                return Ok(CreditOutcome::AlreadyApplied);
            }
        } else {
            info!(
                source = source.as_str(),
                turns, "Applying credit without external reference"
            );
        }

        let before = account.state;
        let mut after = before;
        let balance_after = after.credit(turns);

        let entry = NewEntry {
            kind: LedgerKind::Credit,
            source,
            external_id,
            amount: turns,
            balance_before: before.total(),
            balance_after,
            context,
        };

        match self.insert_entry(account, entry, now, txn).await? {
            Some(inserted) => {
                account.state = after;
                info!(
                    source = source.as_str(),
                    external_id,
                    turns,
                    balance_after,
                    sequence = inserted.sequence,
                    "Credit applied"
                );
                Ok(CreditOutcome::Applied {
                    entry_id: inserted.id,
                    balance_after,
                })
            }
            None => {
                // Lost an insert race to another writer with the same key
                info!(
                    source = source.as_str(),
                    external_id, "Credit already applied by a concurrent writer"
                );
                Ok(CreditOutcome::AlreadyApplied)
            }
        }
    }

    /// Record a consumption attempt. `amount` is 0 for unlimited accounts and
    /// for attempts refused for insufficient balance.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_debit_in_txn(
        &self,
        account: &mut LockedAccount,
        amount: i32,
        balance_before: i32,
        balance_after: i32,
        context: Value,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<entity::ledger_entries::Model> {
        let entry = NewEntry {
            kind: LedgerKind::Debit,
            source: LedgerSource::System,
            external_id: None,
            amount,
            balance_before,
            balance_after,
            context,
        };

        self.insert_entry(account, entry, now, txn)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow!(
                    "Debit entry for account {} was not inserted",
                    account.account_id
                ))
            })
    }

    /// Restore the monthly free allowance if a new UTC month has started,
    /// recording the restored turns as a system credit. Returns whether it ran.
    pub async fn apply_monthly_reset_in_txn(
        &self,
        account: &mut LockedAccount,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<bool> {
        let before = account.state;
        let mut after = before;
        if !after.maybe_reset_free_turns(now) {
            return Ok(false);
        }

        let entry = NewEntry {
            kind: LedgerKind::Credit,
            source: LedgerSource::System,
            external_id: None,
            amount: after.free_turns - before.free_turns,
            balance_before: before.total(),
            balance_after: after.total(),
            context: json!({
                "reason": "monthly_free_reset",
                "previousReset": before
                    .last_free_reset
                    .and_then(|at| at.format(&Rfc3339).ok()),
            }),
        };
        self.insert_entry(account, entry, now, txn).await?;
        account.state = after;

        info!(
            account_id = %account.account_id,
            free_turns = after.free_turns,
            "Monthly free turns reset"
        );
        Ok(true)
    }

    /// Ledger entries for an account, newest first
    pub async fn history(
        &self,
        account_id: Uuid,
        filter: &HistoryFilter,
    ) -> Result<Vec<entity::ledger_entries::Model>> {
        let mut query = entity::ledger_entries::Entity::find()
            .filter(entity::ledger_entries::Column::AccountId.eq(account_id));

        if let Some(kind) = filter.kind {
            query = query.filter(entity::ledger_entries::Column::Kind.eq(kind.as_str()));
        }
        if let Some(source) = filter.source {
            query = query.filter(entity::ledger_entries::Column::Source.eq(source.as_str()));
        }

        let entries = query
            .order_by_desc(entity::ledger_entries::Column::Sequence)
            .limit(filter.effective_limit())
            .all(&self.db)
            .await?;

        Ok(entries)
    }

    pub async fn find_by_external_id(
        &self,
        source: LedgerSource,
        external_id: &str,
    ) -> Result<Option<entity::ledger_entries::Model>> {
        let entry = entity::ledger_entries::Entity::find()
            .filter(entity::ledger_entries::Column::Source.eq(source.as_str()))
            .filter(entity::ledger_entries::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;

        Ok(entry)
    }

    async fn find_in_txn(
        &self,
        source: LedgerSource,
        external_id: &str,
        txn: &DatabaseTransaction,
    ) -> Result<Option<entity::ledger_entries::Model>> {
        let entry = entity::ledger_entries::Entity::find()
            .filter(entity::ledger_entries::Column::Source.eq(source.as_str()))
            .filter(entity::ledger_entries::Column::ExternalId.eq(external_id))
            .one(txn)
            .await?;

        Ok(entry)
    }

    /// Insert with the next per-account sequence. `None` means the
    /// `(source, external_id)` key already existed.
    async fn insert_entry(
        &self,
        account: &mut LockedAccount,
        entry: NewEntry<'_>,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<Option<entity::ledger_entries::Model>> {
        let model = entity::ledger_entries::Model {
            id: Uuid::now_v7(),
            account_id: account.account_id,
            sequence: account.next_sequence(),
            kind: entry.kind.as_str().to_string(),
            source: entry.source.as_str().to_string(),
            external_id: entry.external_id.map(|s| s.to_string()),
            amount: entry.amount,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            context: Some(entry.context),
            occurred_at: now,
        };

        let active = entity::ledger_entries::ActiveModel {
            id: Set(model.id),
            account_id: Set(model.account_id),
            sequence: Set(model.sequence),
            kind: Set(model.kind.clone()),
            source: Set(model.source.clone()),
            external_id: Set(model.external_id.clone()),
            amount: Set(model.amount),
            balance_before: Set(model.balance_before),
            balance_after: Set(model.balance_after),
            context: Set(model.context.clone()),
            occurred_at: Set(model.occurred_at),
        };

        let inserted = entity::ledger_entries::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    entity::ledger_entries::Column::Source,
                    entity::ledger_entries::Column::ExternalId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;

        if inserted == 0 {
            return Ok(None);
        }

        account.ledger_version = model.sequence;
        debug!(
            account_id = %model.account_id,
            sequence = model.sequence,
            kind = %model.kind,
            amount = model.amount,
            "Ledger entry appended"
        );

        Ok(Some(model))
    }
}
