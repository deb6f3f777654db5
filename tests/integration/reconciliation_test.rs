use crate::common::{processor_event, test_config, TestApp, WEBHOOK_SECRET};
use sea_orm::EntityTrait;
use serde_json::json;
use turnledger::{
    models::{
        checkout::CheckoutStatus, common::SubscriptionStatus, processor_event::MalformedEvent,
    },
    services::{
        reconciliation_service::IgnoreReason, webhook_signature::WebhookSignatureVerifier,
        AccountDirectory, IngestOutcome,
    },
};

#[tokio::test]
async fn test_duplicate_order_delivery_credits_once() {
    let app = TestApp::new().await;
    let account = app.register(Some("reader@example.com")).await;

    let order = processor_event(
        "order_created",
        "ord_1",
        json!({ "status": "paid", "first_order_item": { "variant_id": "10_turns" } }),
        Some(account.id),
    );

    let first = app.deliver(&order).await;
    let second = app.deliver(&order).await;

    assert_eq!(
        first,
        IngestOutcome::Credited {
            account_id: account.id,
            turns: 10,
            balance_after: 13,
        }
    );
    assert_eq!(second, IngestOutcome::Duplicate { account_id: account.id });

    let row = app.entitlement(account.id).await;
    assert_eq!(row.paid_turns, 10);
    assert_eq!(row.subscription_status, SubscriptionStatus::Active.as_str());
    assert!(row.last_synced_at.is_some());

    let entries = app.ledger(account.id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].external_id.as_deref(), Some("order:ord_1"));

    let audit = app.audit_rows().await;
    assert_eq!(
        audit.iter().map(|r| r.outcome.as_str()).collect::<Vec<_>>(),
        vec!["applied", "no_change"]
    );
    assert_eq!(audit[0].resolution_strategy.as_deref(), Some("embedded_account_id"));
    assert_eq!(audit[0].payload_sha256, audit[1].payload_sha256);
}

#[tokio::test]
async fn test_processor_variant_ids_map_to_catalog_products() {
    let app = TestApp::new().await;
    let account = app.register(Some("reader@example.com")).await;

    let order = processor_event(
        "order_created",
        "1001",
        json!({ "user_email": "Reader@Example.com", "variant_id": 10002 }),
        None,
    );

    let outcome = app.deliver(&order).await;

    assert!(matches!(outcome, IngestOutcome::Credited { turns: 50, .. }));
    assert_eq!(app.entitlement(account.id).await.paid_turns, 50);
}

#[tokio::test]
async fn test_unresolved_payer_changes_nothing_but_is_audited() {
    let app = TestApp::new().await;
    let bystander = app.register(Some("someone@example.com")).await;

    let order = processor_event(
        "order_created",
        "ord_lost",
        json!({
            "customer_id": "cus_unknown",
            "user_email": "stranger@example.com",
            "variant_id": "10_turns",
        }),
        None,
    );

    let outcome = app.deliver(&order).await;

    assert_eq!(outcome, IngestOutcome::Unresolved);

    let ledger_rows = entity::ledger_entries::Entity::find()
        .all(&app.db)
        .await
        .unwrap();
    assert!(ledger_rows.is_empty());
    assert!(app.ledger(bystander.id).await.is_empty());

    let audit = app.audit_rows().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, "unresolved");
    assert_eq!(audit[0].account_id, None);
    assert_eq!(audit[0].external_id, "ord_lost");
    let detail = audit[0].detail.as_ref().unwrap();
    assert_eq!(detail["customerId"], "cus_unknown");
    assert_eq!(detail["email"], "stranger@example.com");
}

#[tokio::test]
async fn test_bad_signatures_are_dropped_before_parsing() {
    let app = TestApp::new().await;
    let account = app.register(None).await;

    let raw = serde_json::to_vec(&processor_event(
        "order_created",
        "ord_forged",
        json!({ "variant_id": "10_turns" }),
        Some(account.id),
    ))
    .unwrap();
    let forged = WebhookSignatureVerifier::new("not-the-secret").sign(&raw);

    let reconciliation = &app.state.reconciliation_service;
    let wrong = reconciliation
        .ingest_processor_event(&raw, Some(forged.as_str()))
        .await
        .unwrap();
    let missing = reconciliation.ingest_processor_event(&raw, None).await.unwrap();

    assert_eq!(wrong, IngestOutcome::SignatureInvalid);
    assert_eq!(missing, IngestOutcome::SignatureInvalid);
    assert!(app.ledger(account.id).await.is_empty());
    assert!(app.audit_rows().await.is_empty());
}

#[tokio::test]
async fn test_malformed_events_are_rejected_without_audit() {
    let app = TestApp::new().await;

    let unknown = processor_event("license_key_created", "lk_1", json!({}), None);
    let outcome = app.deliver(&unknown).await;

    assert_eq!(
        outcome,
        IngestOutcome::Malformed(MalformedEvent::UnknownEvent(
            "license_key_created".to_string()
        ))
    );

    let raw = b"{ not json";
    let signature = WebhookSignatureVerifier::new(WEBHOOK_SECRET).sign(raw);
    let garbage = app
        .state
        .reconciliation_service
        .ingest_processor_event(raw, Some(signature.as_str()))
        .await
        .unwrap();

    assert!(matches!(garbage, IngestOutcome::Malformed(MalformedEvent::Json(_))));
    assert!(app.audit_rows().await.is_empty());
}

#[tokio::test]
async fn test_test_mode_events_respect_the_sandbox_gate() {
    let mut sandbox = processor_event(
        "order_created",
        "ord_test",
        json!({ "variant_id": "10_turns" }),
        None,
    );
    sandbox["meta"]["test_mode"] = json!(true);

    let live = TestApp::new().await;
    let account = live.register(None).await;
    sandbox["meta"]["custom_data"] = json!({ "account_id": account.id.to_string() });

    assert_eq!(live.deliver(&sandbox).await, IngestOutcome::TestEventDropped);
    assert!(live.ledger(account.id).await.is_empty());
    assert!(live.audit_rows().await.is_empty());

    let mut config = test_config();
    config.processor.accept_test_events = true;
    let staging = TestApp::with_config(config).await;
    let account = staging.register(None).await;
    sandbox["meta"]["custom_data"] = json!({ "account_id": account.id.to_string() });

    assert!(matches!(
        staging.deliver(&sandbox).await,
        IngestOutcome::Credited { .. }
    ));
    assert!(staging.audit_rows().await[0].test_mode);
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let app = TestApp::new().await;
    let account = app.register(Some("subscriber@example.com")).await;
    let event = |name: &str, attributes: serde_json::Value| {
        processor_event(name, "sub_1", attributes, Some(account.id))
    };

    let created = event(
        "subscription_created",
        json!({ "variant_id": "10003", "status": "active" }),
    );
    assert_eq!(
        app.deliver(&created).await,
        IngestOutcome::Credited {
            account_id: account.id,
            turns: 100,
            balance_after: 103,
        }
    );

    let cancelled = app
        .deliver(&event("subscription_cancelled", json!({})))
        .await;
    assert_eq!(
        cancelled,
        IngestOutcome::StatusChanged {
            account_id: account.id,
            from: SubscriptionStatus::Active,
            to: SubscriptionStatus::Cancelled,
        }
    );

    // Replayed creation after cancellation neither credits nor reactivates
    assert_eq!(
        app.deliver(&created).await,
        IngestOutcome::Duplicate { account_id: account.id }
    );
    assert_eq!(
        app.entitlement(account.id).await.subscription_status,
        SubscriptionStatus::Cancelled.as_str()
    );

    let resumed = app
        .deliver(&event("subscription_resumed", json!({})))
        .await;
    assert!(matches!(
        resumed,
        IngestOutcome::StatusChanged {
            to: SubscriptionStatus::Active,
            ..
        }
    ));

    let updated = app
        .deliver(&event("subscription_updated", json!({ "status": "cancelled" })))
        .await;
    assert!(matches!(
        updated,
        IngestOutcome::StatusChanged {
            to: SubscriptionStatus::Cancelled,
            ..
        }
    ));

    let repeated = app
        .deliver(&event("subscription_cancelled", json!({})))
        .await;
    assert_eq!(repeated, IngestOutcome::NoChange { account_id: account.id });

    let row = app.entitlement(account.id).await;
    assert_eq!(row.paid_turns, 100);
    assert_eq!(row.subscription_status, SubscriptionStatus::Cancelled.as_str());
}

#[tokio::test]
async fn test_invalid_transition_is_ignored_and_audited() {
    let app = TestApp::new().await;
    let account = app.register(None).await;

    let cancel = processor_event("subscription_cancelled", "sub_x", json!({}), Some(account.id));
    let outcome = app.deliver(&cancel).await;

    assert_eq!(
        outcome,
        IngestOutcome::Ignored {
            account_id: account.id,
            reason: IgnoreReason::InvalidTransition {
                from: SubscriptionStatus::None,
                to: SubscriptionStatus::Cancelled,
            },
        }
    );
    assert_eq!(
        app.entitlement(account.id).await.subscription_status,
        SubscriptionStatus::None.as_str()
    );

    let audit = app.audit_rows().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, "ignored");
    assert_eq!(audit[0].from_status.as_deref(), Some("none"));
    assert_eq!(audit[0].to_status.as_deref(), Some("none"));
    assert_eq!(
        audit[0].detail.as_ref().unwrap()["ignored"]["reason"],
        "invalid_transition"
    );
}

#[tokio::test]
async fn test_events_that_grant_nothing_are_ignored() {
    let app = TestApp::new().await;
    let account = app.register(None).await;

    let unknown_variant = processor_event(
        "order_created",
        "ord_odd",
        json!({ "variant_id": "99999" }),
        Some(account.id),
    );
    let unpaid = processor_event(
        "order_created",
        "ord_pending",
        json!({ "variant_id": "10_turns", "status": "pending" }),
        Some(account.id),
    );
    let past_due = processor_event(
        "subscription_updated",
        "sub_2",
        json!({ "status": "past_due" }),
        Some(account.id),
    );

    assert_eq!(
        app.deliver(&unknown_variant).await,
        IngestOutcome::Ignored {
            account_id: account.id,
            reason: IgnoreReason::UnknownVariant("99999".to_string()),
        }
    );
    assert_eq!(
        app.deliver(&unpaid).await,
        IngestOutcome::Ignored {
            account_id: account.id,
            reason: IgnoreReason::OrderNotPaid("pending".to_string()),
        }
    );
    assert_eq!(
        app.deliver(&past_due).await,
        IngestOutcome::Ignored {
            account_id: account.id,
            reason: IgnoreReason::UnmappedStatus("past_due".to_string()),
        }
    );

    assert!(app.ledger(account.id).await.is_empty());
    assert!(app
        .audit_rows()
        .await
        .iter()
        .all(|row| row.outcome == "ignored"));
}

#[tokio::test]
async fn test_checkout_is_completed_and_customer_linked() {
    let app = TestApp::new().await;
    let account = app.register(Some("buyer@example.com")).await;
    let checkout = app
        .state
        .checkout_service
        .create_checkout(account.id, "10_turns", Some("chk_1"))
        .await
        .unwrap();

    let first_order = processor_event(
        "order_created",
        "ord_a",
        json!({
            "customer_id": "cus_77",
            "user_email": "BUYER@example.com",
            "variant_id": "10_turns",
        }),
        None,
    );
    assert!(matches!(
        app.deliver(&first_order).await,
        IngestOutcome::Credited { .. }
    ));

    let stored = entity::pending_checkouts::Entity::find_by_id(checkout.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CheckoutStatus::Completed.as_str());
    assert_eq!(stored.processor_customer_id.as_deref(), Some("cus_77"));
    assert_eq!(stored.resolved_event_id.as_deref(), Some("order_created:ord_a"));

    let audit = app.audit_rows().await;
    assert_eq!(
        audit[0].resolution_strategy.as_deref(),
        Some("pending_checkout_email")
    );
    assert_eq!(audit[0].detail.as_ref().unwrap()["checkoutCompleted"], true);

    let linked = app
        .directory
        .find_by_processor_customer_id("cus_77")
        .await
        .unwrap()
        .expect("customer id linked");
    assert_eq!(linked.id, account.id);

    // A renewal with nothing but the customer id still finds the account
    let renewal = processor_event(
        "order_created",
        "ord_b",
        json!({ "customer_id": "cus_77", "variant_id": "10_turns" }),
        None,
    );
    assert!(matches!(
        app.deliver(&renewal).await,
        IngestOutcome::Credited { balance_after: 23, .. }
    ));
    assert_eq!(
        app.audit_rows().await[1].resolution_strategy.as_deref(),
        Some("linked_customer_id")
    );
}
