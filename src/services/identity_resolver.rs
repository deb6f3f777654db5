//! Mapping processor payers back to internal accounts.
//!
//! Strategies run in a fixed order and the first hit wins. Each strategy
//! is independently callable so tests can exercise them in isolation.

use crate::{
    error::Result,
    models::{
        checkout::{CheckoutStatus, PendingCheckoutExt},
        processor_event::PayerRef,
    },
    services::account_directory::AccountDirectory,
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DatabaseTransaction,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Account id passed through checkout custom data
    EmbeddedAccountId,
    /// Open pending checkout already tagged with the processor customer id
    PendingCheckoutByCustomer,
    /// Open pending checkout whose email snapshot matches the payer email
    PendingCheckoutByEmail,
    /// Account previously linked to the processor customer id
    LinkedCustomerId,
    /// Account whose email matches the payer email
    AccountEmail,
}

impl MatchStrategy {
    /// Most reliable first
    pub const ORDERED: [MatchStrategy; 5] = [
        MatchStrategy::EmbeddedAccountId,
        MatchStrategy::PendingCheckoutByCustomer,
        MatchStrategy::PendingCheckoutByEmail,
        MatchStrategy::LinkedCustomerId,
        MatchStrategy::AccountEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddedAccountId => "embedded_account_id",
            Self::PendingCheckoutByCustomer => "pending_checkout_customer_id",
            Self::PendingCheckoutByEmail => "pending_checkout_email",
            Self::LinkedCustomerId => "linked_customer_id",
            Self::AccountEmail => "account_email",
        }
    }
}

/// How an ambiguous pending-checkout match was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieBreak {
    pub candidates: usize,
    pub chosen_checkout: Uuid,
}

impl TieBreak {
    pub const RULE: &'static str = "most_recently_created";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub account_id: Uuid,
    pub strategy: MatchStrategy,
    /// Pending checkout to mark completed when the event is applied
    pub checkout_id: Option<Uuid>,
    pub tie_break: Option<TieBreak>,
}

impl Resolution {
    fn direct(account_id: Uuid, strategy: MatchStrategy) -> Self {
        Self {
            account_id,
            strategy,
            checkout_id: None,
            tie_break: None,
        }
    }
}

pub struct IdentityResolver {
    db: DatabaseConnection,
    directory: Arc<dyn AccountDirectory>,
}

impl IdentityResolver {
    pub fn new(db: DatabaseConnection, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { db, directory }
    }

    /// Try every strategy in order. `None` means the payer is unknown and
    /// the event must not touch any account.
    #[instrument(skip(self, payer), fields(customer_id = ?payer.customer_id))]
    pub async fn resolve(
        &self,
        payer: &PayerRef,
        now: OffsetDateTime,
    ) -> Result<Option<Resolution>> {
        for strategy in MatchStrategy::ORDERED {
            match self.try_strategy(strategy, payer, now).await? {
                Some(resolution) => {
                    info!(
                        account_id = %resolution.account_id,
                        strategy = strategy.as_str(),
                        "Resolved payer to account"
                    );
                    if let Some(tie_break) = resolution.tie_break {
                        warn!(
                            candidates = tie_break.candidates,
                            chosen_checkout = %tie_break.chosen_checkout,
                            rule = TieBreak::RULE,
                            "Several open checkouts matched; picked one"
                        );
                    }
                    return Ok(Some(resolution));
                }
                None => debug!(strategy = strategy.as_str(), "Strategy did not match"),
            }
        }

        Ok(None)
    }

    pub async fn try_strategy(
        &self,
        strategy: MatchStrategy,
        payer: &PayerRef,
        now: OffsetDateTime,
    ) -> Result<Option<Resolution>> {
        match strategy {
            MatchStrategy::EmbeddedAccountId => {
                let Some(account_id) = payer.embedded_account_id else {
                    return Ok(None);
                };
                match self.directory.find_by_id(account_id).await? {
                    Some(account) => Ok(Some(Resolution::direct(account.id, strategy))),
                    None => {
                        warn!(account_id = %account_id, "Embedded account id does not exist");
                        Ok(None)
                    }
                }
            }
            MatchStrategy::PendingCheckoutByCustomer => {
                let Some(customer_id) = payer.customer_id.as_deref() else {
                    return Ok(None);
                };
                let candidates = entity::pending_checkouts::Entity::find()
                    .filter(entity::pending_checkouts::Column::ProcessorCustomerId.eq(customer_id))
                    .filter(
                        entity::pending_checkouts::Column::Status
                            .eq(CheckoutStatus::Pending.as_str()),
                    )
                    .all(&self.db)
                    .await?;
                Ok(pick_checkout(candidates, strategy, now))
            }
            MatchStrategy::PendingCheckoutByEmail => {
                let Some(email) = payer.email.as_deref() else {
                    return Ok(None);
                };
                let candidates = entity::pending_checkouts::Entity::find()
                    .filter(entity::pending_checkouts::Column::AccountEmailSnapshot.eq(email))
                    .filter(
                        entity::pending_checkouts::Column::Status
                            .eq(CheckoutStatus::Pending.as_str()),
                    )
                    .all(&self.db)
                    .await?;
                Ok(pick_checkout(candidates, strategy, now))
            }
            MatchStrategy::LinkedCustomerId => {
                let Some(customer_id) = payer.customer_id.as_deref() else {
                    return Ok(None);
                };
                let account = self
                    .directory
                    .find_by_processor_customer_id(customer_id)
                    .await?;
                Ok(account.map(|account| Resolution::direct(account.id, strategy)))
            }
            MatchStrategy::AccountEmail => {
                let Some(email) = payer.email.as_deref() else {
                    return Ok(None);
                };
                let account = self.directory.find_by_email(email).await?;
                Ok(account.map(|account| Resolution::direct(account.id, strategy)))
            }
        }
    }

    /// Mark a pending checkout completed. Returns false if it was no longer
    /// pending, which makes redelivery a no-op.
    pub async fn complete_checkout_in_txn(
        &self,
        checkout_id: Uuid,
        customer_id: Option<&str>,
        event_ref: &str,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<bool> {
        let mut update = entity::pending_checkouts::Entity::update_many()
            .col_expr(
                entity::pending_checkouts::Column::Status,
                Expr::value(CheckoutStatus::Completed.as_str()),
            )
            .col_expr(
                entity::pending_checkouts::Column::CompletedAt,
                Expr::value(Some(now)),
            )
            .col_expr(
                entity::pending_checkouts::Column::ResolvedEventId,
                Expr::value(Some(event_ref.to_string())),
            );

        if let Some(customer_id) = customer_id {
            update = update.col_expr(
                entity::pending_checkouts::Column::ProcessorCustomerId,
                Expr::value(Some(customer_id.to_string())),
            );
        }

        let result = update
            .filter(entity::pending_checkouts::Column::Id.eq(checkout_id))
            .filter(entity::pending_checkouts::Column::Status.eq(CheckoutStatus::Pending.as_str()))
            .exec(txn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

/// Most recently created open checkout wins; ties on creation time fall back to id
fn pick_checkout(
    candidates: Vec<entity::pending_checkouts::Model>,
    strategy: MatchStrategy,
    now: OffsetDateTime,
) -> Option<Resolution> {
    let mut open: Vec<_> = candidates
        .into_iter()
        .filter(|checkout| checkout.is_open(now))
        .collect();
    open.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let candidates = open.len();
    let chosen = open.into_iter().next()?;

    Some(Resolution {
        account_id: chosen.account_id,
        strategy,
        checkout_id: Some(chosen.id),
        tie_break: (candidates > 1).then_some(TieBreak {
            candidates,
            chosen_checkout: chosen.id,
        }),
    })
}
