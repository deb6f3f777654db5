//! Entry point for external payment signals.
//!
//! Processor webhooks pass through signature check, validating parse, the
//! test-mode gate and identity resolution before anything is written. The
//! credit, status change, checkout completion and audit row for one event
//! commit together under the account lock.

use crate::{
    config::{BlockchainConfig, ProcessorConfig},
    error::{ApiError, Result},
    models::{
        blockchain::{normalize_tx_ref, ClaimOutcome, RejectionReason, VerificationOutcome},
        common::{LedgerSource, StatusTransition, SubscriptionStatus},
        ledger::CreditOutcome,
        processor_event::{MalformedEvent, ProcessorEvent},
    },
    services::{
        account_directory::AccountDirectory,
        account_locks::AccountLocks,
        blockchain_verifier::BlockchainVerifier,
        catalog::ProductCatalog,
        entitlement_service::EntitlementService,
        identity_resolver::{IdentityResolver, MatchStrategy, Resolution, TieBreak},
        ledger_service::LedgerService,
        webhook_signature::WebhookSignatureVerifier,
    },
};
use rust_decimal::Decimal;
use sea_orm::{entity::*, ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Why a well-formed, resolved event left the account untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownVariant(String),
    OrderNotPaid(String),
    UnmappedStatus(String),
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
}

impl IgnoreReason {
    fn detail(&self) -> Value {
        match self {
            Self::UnknownVariant(variant) => json!({"reason": "unknown_variant", "variant": variant}),
            Self::OrderNotPaid(status) => json!({"reason": "order_not_paid", "orderStatus": status}),
            Self::UnmappedStatus(status) => {
                json!({"reason": "unmapped_status", "reportedStatus": status})
            }
            Self::InvalidTransition { from, to } => json!({
                "reason": "invalid_transition",
                "from": from.as_str(),
                "to": to.as_str(),
            }),
        }
    }
}

/// Typed result of ingesting one processor webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    SignatureInvalid,
    Malformed(MalformedEvent),
    TestEventDropped,
    Unresolved,
    Credited {
        account_id: Uuid,
        turns: i32,
        balance_after: i32,
    },
    /// The credit for this event was already in the ledger
    Duplicate { account_id: Uuid },
    StatusChanged {
        account_id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    NoChange { account_id: Uuid },
    Ignored {
        account_id: Uuid,
        reason: IgnoreReason,
    },
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::Malformed(_) => "malformed",
            Self::TestEventDropped => "test_event_dropped",
            Self::Unresolved => "unresolved",
            Self::Credited { .. } => "credited",
            Self::Duplicate { .. } => "duplicate",
            Self::StatusChanged { .. } => "status_changed",
            Self::NoChange { .. } => "no_change",
            Self::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusChange {
    Set(SubscriptionStatus),
    /// First purchase activates; later orders leave the status alone
    ActivateIfNone,
}

#[derive(Debug, Clone)]
struct PlannedCredit {
    external_id: String,
    variant: String,
    turns: i32,
}

#[derive(Debug, Clone)]
struct EventPlan {
    credit: Option<PlannedCredit>,
    status: StatusChange,
}

/// Audit-trail outcomes
mod audit_outcome {
    pub const APPLIED: &str = "applied";
    pub const NO_CHANGE: &str = "no_change";
    pub const IGNORED: &str = "ignored";
    pub const UNRESOLVED: &str = "unresolved";
}

struct AuditRecord<'a> {
    event: &'a ProcessorEvent,
    account_id: Option<Uuid>,
    resolution: Option<&'a Resolution>,
    from: Option<SubscriptionStatus>,
    to: Option<SubscriptionStatus>,
    outcome: &'static str,
    detail: Value,
    digest: &'a str,
}

pub struct ReconciliationService {
    db: DatabaseConnection,
    locks: Arc<AccountLocks>,
    entitlements: Arc<EntitlementService>,
    ledger: Arc<LedgerService>,
    directory: Arc<dyn AccountDirectory>,
    resolver: IdentityResolver,
    verifier: Arc<BlockchainVerifier>,
    catalog: Arc<ProductCatalog>,
    signatures: WebhookSignatureVerifier,
    accept_test_events: bool,
    blockchain_currency: String,
}

impl ReconciliationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DatabaseConnection,
        locks: Arc<AccountLocks>,
        entitlements: Arc<EntitlementService>,
        ledger: Arc<LedgerService>,
        directory: Arc<dyn AccountDirectory>,
        verifier: Arc<BlockchainVerifier>,
        catalog: Arc<ProductCatalog>,
        processor: &ProcessorConfig,
        blockchain: &BlockchainConfig,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(db.clone(), directory.clone()),
            db,
            locks,
            entitlements,
            ledger,
            directory,
            verifier,
            catalog,
            signatures: WebhookSignatureVerifier::new(&processor.webhook_secret),
            accept_test_events: processor.accept_test_events,
            blockchain_currency: blockchain.currency.to_uppercase(),
        }
    }

    /// Ingest one raw processor webhook body.
    ///
    /// Only infrastructure failures are returned as `Err`.
    #[instrument(skip(self, raw, signature), fields(bytes = raw.len()))]
    pub async fn ingest_processor_event(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestOutcome> {
        let signed = signature
            .map(|signature| self.signatures.verify(raw, signature))
            .unwrap_or(false);
        if !signed {
            warn!(
                signature_present = signature.is_some(),
                "Webhook signature invalid, dropping event"
            );
            return Ok(IngestOutcome::SignatureInvalid);
        }

        let event = match ProcessorEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Rejected malformed processor event");
                return Ok(IngestOutcome::Malformed(e));
            }
        };

        if event.is_test() && !self.accept_test_events {
            info!(
                event = event.event_name(),
                object_id = event.object_id(),
                "Dropping test-mode event"
            );
            return Ok(IngestOutcome::TestEventDropped);
        }

        let digest = hex::encode(Sha256::digest(raw));
        let now = OffsetDateTime::now_utc();

        let Some(resolution) = self.resolver.resolve(event.payer(), now).await? else {
            let payer = event.payer();
            warn!(
                event = event.event_name(),
                object_id = event.object_id(),
                customer_id = ?payer.customer_id,
                email = ?payer.email,
                embedded_account_id = ?payer.embedded_account_id,
                payload_sha256 = %digest,
                "Unresolved payer identity, no credit applied"
            );
            self.record_event(
                &self.db,
                AuditRecord {
                    event: &event,
                    account_id: None,
                    resolution: None,
                    from: None,
                    to: None,
                    outcome: audit_outcome::UNRESOLVED,
                    detail: json!({}),
                    digest: &digest,
                },
                now,
            )
            .await?;
            return Ok(IngestOutcome::Unresolved);
        };

        let account_id = resolution.account_id;

        let plan = match self.plan(&event) {
            Ok(plan) => plan,
            Err(reason) => {
                info!(
                    account_id = %account_id,
                    event = event.event_name(),
                    reason = ?reason,
                    "Processor event ignored"
                );
                self.record_event(
                    &self.db,
                    AuditRecord {
                        event: &event,
                        account_id: Some(account_id),
                        resolution: Some(&resolution),
                        from: None,
                        to: None,
                        outcome: audit_outcome::IGNORED,
                        detail: reason.detail(),
                        digest: &digest,
                    },
                    now,
                )
                .await?;
                return Ok(IngestOutcome::Ignored { account_id, reason });
            }
        };

        let outcome = self
            .apply_event(&event, &resolution, plan, &digest, now)
            .await?;

        // Renewals carry only the customer id; remember it for next time
        if let Some(customer_id) = event.payer().customer_id.as_deref() {
            if resolution.strategy != MatchStrategy::LinkedCustomerId {
                if let Err(e) = self
                    .directory
                    .link_processor_customer(account_id, customer_id)
                    .await
                {
                    warn!(account_id = %account_id, error = %e, "Failed to link processor customer id");
                }
            }
        }

        Ok(outcome)
    }

    fn plan(&self, event: &ProcessorEvent) -> std::result::Result<EventPlan, IgnoreReason> {
        let planned_credit = |variant_ref: &str| -> std::result::Result<PlannedCredit, IgnoreReason> {
            let product = self
                .catalog
                .find_for_processor(variant_ref)
                .ok_or_else(|| IgnoreReason::UnknownVariant(variant_ref.to_string()))?;
            Ok(PlannedCredit {
                external_id: event.credit_external_id().unwrap_or_default(),
                variant: product.variant.clone(),
                turns: product.turns_granted,
            })
        };

        match event {
            ProcessorEvent::SubscriptionCreated(e) => {
                let variant = e.variant.as_deref().unwrap_or_default();
                Ok(EventPlan {
                    credit: Some(planned_credit(variant)?),
                    status: StatusChange::Set(SubscriptionStatus::Active),
                })
            }
            ProcessorEvent::OrderCreated(e) => {
                if let Some(status) = e.status.as_deref().filter(|status| *status != "paid") {
                    return Err(IgnoreReason::OrderNotPaid(status.to_string()));
                }
                Ok(EventPlan {
                    credit: Some(planned_credit(&e.variant)?),
                    status: StatusChange::ActivateIfNone,
                })
            }
            ProcessorEvent::SubscriptionUpdated(e) => {
                let target = match e.status.as_deref() {
                    Some("active") | Some("on_trial") => SubscriptionStatus::Active,
                    Some("cancelled") => SubscriptionStatus::Cancelled,
                    other => {
                        return Err(IgnoreReason::UnmappedStatus(
                            other.unwrap_or("missing").to_string(),
                        ))
                    }
                };
                Ok(EventPlan {
                    credit: None,
                    status: StatusChange::Set(target),
                })
            }
            ProcessorEvent::SubscriptionCancelled(_) => Ok(EventPlan {
                credit: None,
                status: StatusChange::Set(SubscriptionStatus::Cancelled),
            }),
            ProcessorEvent::SubscriptionResumed(_) => Ok(EventPlan {
                credit: None,
                status: StatusChange::Set(SubscriptionStatus::Active),
            }),
        }
    }

    async fn apply_event(
        &self,
        event: &ProcessorEvent,
        resolution: &Resolution,
        plan: EventPlan,
        digest: &str,
        now: OffsetDateTime,
    ) -> Result<IngestOutcome> {
        let account_id = resolution.account_id;
        let _guard = self.locks.acquire(account_id).await?;
        let txn = self.db.begin().await?;

        let mut account = self.entitlements.lock_in_txn(account_id, now, &txn).await?;
        let from = account.subscription_status;

        let event_ref = format!("{}:{}", event.event_name(), event.object_id());
        let mut checkout_completed = false;
        if let Some(checkout_id) = resolution.checkout_id {
            checkout_completed = self
                .resolver
                .complete_checkout_in_txn(
                    checkout_id,
                    event.payer().customer_id.as_deref(),
                    &event_ref,
                    now,
                    &txn,
                )
                .await?;
        }

        let credit = match &plan.credit {
            Some(planned) => {
                let context = json!({
                    "event": event.event_name(),
                    "objectId": event.object_id(),
                    "variant": planned.variant,
                    "strategy": resolution.strategy.as_str(),
                    "payloadSha256": digest,
                });
                let outcome = self
                    .ledger
                    .try_append_credit_in_txn(
                        &mut account,
                        LedgerSource::Processor,
                        Some(&planned.external_id),
                        planned.turns,
                        context,
                        now,
                        &txn,
                    )
                    .await?;
                Some((planned, outcome))
            }
            None => None,
        };

        // A replayed creation must not undo a later cancellation
        let replayed = matches!(credit, Some((_, CreditOutcome::AlreadyApplied)));
        let transition = match plan.status {
            _ if replayed => StatusTransition::NoChange(from),
            StatusChange::Set(to) => from.transition(to),
            StatusChange::ActivateIfNone if from == SubscriptionStatus::None => {
                from.transition(SubscriptionStatus::Active)
            }
            StatusChange::ActivateIfNone => StatusTransition::NoChange(from),
        };

        if let StatusTransition::Applied { to, .. } = transition {
            account.subscription_status = to;
        }
        account.last_synced_at = Some(now);
        self.entitlements.persist(&account, now, &txn).await?;

        let outcome = match (&credit, transition) {
            (
                Some((
                    planned,
                    CreditOutcome::Applied {
                        balance_after, ..
                    },
                )),
                _,
            ) => IngestOutcome::Credited {
                account_id,
                turns: planned.turns,
                balance_after: *balance_after,
            },
            (_, StatusTransition::Invalid { from, to }) => {
                warn!(
                    account_id = %account_id,
                    event = event.event_name(),
                    from = from.as_str(),
                    to = to.as_str(),
                    "Invalid subscription transition ignored"
                );
                IngestOutcome::Ignored {
                    account_id,
                    reason: IgnoreReason::InvalidTransition { from, to },
                }
            }
            (_, StatusTransition::Applied { from, to }) => IngestOutcome::StatusChanged {
                account_id,
                from,
                to,
            },
            (Some((_, CreditOutcome::AlreadyApplied)), _) => {
                IngestOutcome::Duplicate { account_id }
            }
            (None, StatusTransition::NoChange(_)) => IngestOutcome::NoChange { account_id },
        };

        let audit_outcome = match &outcome {
            IngestOutcome::Credited { .. } | IngestOutcome::StatusChanged { .. } => {
                audit_outcome::APPLIED
            }
            IngestOutcome::Ignored { .. } => audit_outcome::IGNORED,
            _ => audit_outcome::NO_CHANGE,
        };

        let mut detail = json!({ "checkoutCompleted": checkout_completed });
        if let Some((planned, credit_outcome)) = &credit {
            detail["credit"] = json!({
                "externalId": planned.external_id,
                "turns": planned.turns,
                "applied": credit_outcome.is_applied(),
            });
        }
        if let IngestOutcome::Ignored { reason, .. } = &outcome {
            detail["ignored"] = reason.detail();
        }

        self.record_event(
            &txn,
            AuditRecord {
                event,
                account_id: Some(account_id),
                resolution: Some(resolution),
                from: Some(from),
                to: Some(account.subscription_status),
                outcome: audit_outcome,
                detail,
                digest,
            },
            now,
        )
        .await?;

        txn.commit().await?;

        match &outcome {
            IngestOutcome::Duplicate { .. } => info!(
                account_id = %account_id,
                event = event.event_name(),
                object_id = event.object_id(),
                "Duplicate processor event, credit already applied"
            ),
            other => info!(
                account_id = %account_id,
                event = event.event_name(),
                object_id = event.object_id(),
                outcome = other.label(),
                "Processor event applied"
            ),
        }

        Ok(outcome)
    }

    async fn record_event<C: ConnectionTrait>(
        &self,
        conn: &C,
        record: AuditRecord<'_>,
        now: OffsetDateTime,
    ) -> Result<()> {
        let payer = record.event.payer();
        let mut detail = record.detail;
        detail["customerId"] = json!(payer.customer_id);
        detail["email"] = json!(payer.email);
        if let Some(tie_break) = record.resolution.and_then(|r| r.tie_break) {
            detail["tieBreak"] = json!({
                "rule": TieBreak::RULE,
                "candidates": tie_break.candidates,
                "chosenCheckout": tie_break.chosen_checkout,
            });
        }

        let audit = entity::subscription_events::ActiveModel {
            id: Set(Uuid::now_v7()),
            account_id: Set(record.account_id),
            event_name: Set(record.event.event_name().to_string()),
            external_id: Set(record.event.object_id().to_string()),
            test_mode: Set(record.event.is_test()),
            resolution_strategy: Set(record.resolution.map(|r| r.strategy.as_str().to_string())),
            from_status: Set(record.from.map(|s| s.as_str().to_string())),
            to_status: Set(record.to.map(|s| s.as_str().to_string())),
            outcome: Set(record.outcome.to_string()),
            detail: Set(Some(detail)),
            payload_sha256: Set(record.digest.to_string()),
            received_at: Set(now),
        };

        audit.insert(conn).await?;
        Ok(())
    }

    /// Verify and credit a user-submitted on-chain payment
    #[instrument(skip(self, claimed_amount))]
    pub async fn ingest_blockchain_claim(
        &self,
        account_id: Uuid,
        tx_ref: &str,
        claimed_amount: Decimal,
        claimed_sender: &str,
        product_variant: &str,
    ) -> Result<ClaimOutcome> {
        let Some(tx_ref) = normalize_tx_ref(tx_ref) else {
            return Ok(ClaimOutcome::rejected(RejectionReason::MalformedTransaction {
                detail: "transaction reference must be 0x followed by 64 hex digits".to_string(),
            }));
        };

        let product = self.catalog.find(product_variant).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown product variant: {}", product_variant))
        })?;
        let expected_amount = product
            .expected_amount(&self.blockchain_currency)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Variant {} cannot be paid in {}",
                    product_variant, self.blockchain_currency
                ))
            })?;

        if claimed_amount != expected_amount {
            warn!(
                account_id = %account_id,
                expected = %expected_amount,
                claimed = %claimed_amount,
                "Claimed amount does not match catalog price"
            );
            return Ok(ClaimOutcome::rejected(RejectionReason::AmountMismatch {
                expected: expected_amount,
                actual: claimed_amount,
            }));
        }

        if let Some(existing) = self
            .ledger
            .find_by_external_id(LedgerSource::Blockchain, &tx_ref)
            .await?
        {
            if existing.account_id != account_id {
                warn!(
                    account_id = %account_id,
                    credited_account = %existing.account_id,
                    tx_ref = %tx_ref,
                    "Transaction already credited to a different account"
                );
            } else {
                info!(tx_ref = %tx_ref, "Blockchain payment already processed");
            }
            return Ok(ClaimOutcome::AlreadyProcessed);
        }

        // Network I/O happens before any lock is taken
        let transfer = match self
            .verifier
            .verify(&tx_ref, expected_amount, claimed_sender)
            .await
        {
            VerificationOutcome::Verified(transfer) => transfer,
            VerificationOutcome::Rejected(reason) => return Ok(ClaimOutcome::rejected(reason)),
        };

        let _guard = self.locks.acquire(account_id).await?;
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let mut account = self.entitlements.lock_in_txn(account_id, now, &txn).await?;
        let context = json!({
            "variant": product.variant,
            "currency": self.blockchain_currency,
            "amount": transfer.amount.to_string(),
            "sender": transfer.sender,
            "recipient": transfer.recipient,
            "confirmations": transfer.confirmations,
        });

        let outcome = self
            .ledger
            .try_append_credit_in_txn(
                &mut account,
                LedgerSource::Blockchain,
                Some(&tx_ref),
                product.turns_granted,
                context,
                now,
                &txn,
            )
            .await?;

        match outcome {
            CreditOutcome::Applied { balance_after, .. } => {
                account.last_synced_at = Some(now);
                self.entitlements.persist(&account, now, &txn).await?;
                txn.commit().await?;

                info!(
                    account_id = %account_id,
                    tx_ref = %tx_ref,
                    turns = product.turns_granted,
                    balance_after,
                    "Blockchain payment credited"
                );
                Ok(ClaimOutcome::Credited {
                    turns: product.turns_granted,
                    balance_after,
                    transfer,
                })
            }
            CreditOutcome::AlreadyApplied => {
                txn.commit().await?;
                Ok(ClaimOutcome::AlreadyProcessed)
            }
        }
    }
}
