use crate::common::{processor_event, TestApp};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use turnledger::{
    models::{checkout::CheckoutStatus, processor_event::PayerRef},
    services::{
        identity_resolver::{MatchStrategy, TieBreak},
        AccountDirectory, IdentityResolver, IngestOutcome, SeaOrmAccountDirectory,
    },
};
use uuid::Uuid;

fn resolver(app: &TestApp) -> IdentityResolver {
    let directory: Arc<dyn AccountDirectory> =
        Arc::new(SeaOrmAccountDirectory::new(app.db.clone()));
    IdentityResolver::new(app.db.clone(), directory)
}

/// Insert a pending checkout with explicit timestamps
async fn pending_checkout(
    app: &TestApp,
    account_id: Uuid,
    email: &str,
    customer_id: Option<&str>,
    created_at: OffsetDateTime,
    ttl: Duration,
) -> Uuid {
    let checkout = entity::pending_checkouts::ActiveModel {
        id: Set(Uuid::now_v7()),
        account_id: Set(account_id),
        checkout_id: Set(None),
        product_variant: Set("10_turns".to_string()),
        account_email_snapshot: Set(email.to_string()),
        status: Set(CheckoutStatus::Pending.as_str().to_string()),
        processor_customer_id: Set(customer_id.map(|s| s.to_string())),
        resolved_event_id: Set(None),
        created_at: Set(created_at),
        expires_at: Set(created_at + ttl),
        completed_at: Set(None),
    };
    checkout.insert(&app.db).await.unwrap().id
}

fn payer(customer_id: Option<&str>, email: Option<&str>) -> PayerRef {
    PayerRef {
        embedded_account_id: None,
        customer_id: customer_id.map(|s| s.to_string()),
        email: email.map(|s| s.to_string()),
    }
}

#[tokio::test]
async fn test_each_strategy_matches_independently() {
    let app = TestApp::new().await;
    let resolver = resolver(&app);
    let now = OffsetDateTime::now_utc();

    let embedded = app.register(None).await;
    let by_checkout_customer = app.register(Some("a@example.com")).await;
    let by_checkout_email = app.register(Some("b@example.com")).await;
    let linked = app.register(None).await;
    let by_email = app.register(Some("c@example.com")).await;

    pending_checkout(
        &app,
        by_checkout_customer.id,
        "a@example.com",
        Some("cus_a"),
        now,
        Duration::hours(1),
    )
    .await;
    pending_checkout(
        &app,
        by_checkout_email.id,
        "b@example.com",
        None,
        now,
        Duration::hours(1),
    )
    .await;
    app.directory
        .link_processor_customer(linked.id, "cus_linked")
        .await
        .unwrap();

    let cases = [
        (
            MatchStrategy::EmbeddedAccountId,
            PayerRef {
                embedded_account_id: Some(embedded.id),
                ..Default::default()
            },
            embedded.id,
        ),
        (
            MatchStrategy::PendingCheckoutByCustomer,
            payer(Some("cus_a"), None),
            by_checkout_customer.id,
        ),
        (
            MatchStrategy::PendingCheckoutByEmail,
            payer(None, Some("b@example.com")),
            by_checkout_email.id,
        ),
        (
            MatchStrategy::LinkedCustomerId,
            payer(Some("cus_linked"), None),
            linked.id,
        ),
        (
            MatchStrategy::AccountEmail,
            payer(None, Some("c@example.com")),
            by_email.id,
        ),
    ];

    for (strategy, payer, expected) in cases {
        let resolution = resolver
            .try_strategy(strategy, &payer, now)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{} should match", strategy.as_str()));
        assert_eq!(resolution.account_id, expected, "{}", strategy.as_str());
        assert_eq!(resolution.strategy, strategy);

        let full = resolver.resolve(&payer, now).await.unwrap().unwrap();
        assert_eq!(full.strategy, strategy);
    }

    // No strategy can use an empty payer
    assert!(resolver
        .resolve(&PayerRef::default(), now)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_earlier_strategies_win() {
    let app = TestApp::new().await;
    let resolver = resolver(&app);
    let now = OffsetDateTime::now_utc();

    let embedded = app.register(None).await;
    let emailed = app.register(Some("payer@example.com")).await;

    let payer = PayerRef {
        embedded_account_id: Some(embedded.id),
        customer_id: None,
        email: Some("payer@example.com".to_string()),
    };

    let resolution = resolver.resolve(&payer, now).await.unwrap().unwrap();
    assert_eq!(resolution.account_id, embedded.id);
    assert_eq!(resolution.strategy, MatchStrategy::EmbeddedAccountId);

    // An embedded id that does not exist falls through to later strategies
    let stale = PayerRef {
        embedded_account_id: Some(Uuid::new_v4()),
        ..payer
    };
    let resolution = resolver.resolve(&stale, now).await.unwrap().unwrap();
    assert_eq!(resolution.account_id, emailed.id);
    assert_eq!(resolution.strategy, MatchStrategy::AccountEmail);
}

#[tokio::test]
async fn test_expired_checkouts_never_match() {
    let app = TestApp::new().await;
    let resolver = resolver(&app);
    let now = OffsetDateTime::now_utc();
    let account = app.register(None).await;

    pending_checkout(
        &app,
        account.id,
        "late@example.com",
        Some("cus_late"),
        now - Duration::hours(30),
        Duration::hours(24),
    )
    .await;

    let payer = payer(Some("cus_late"), Some("late@example.com"));
    assert!(resolver.resolve(&payer, now).await.unwrap().is_none());
}

#[tokio::test]
async fn test_most_recent_checkout_wins_a_tie() {
    let app = TestApp::new().await;
    let resolver = resolver(&app);
    let now = OffsetDateTime::now_utc();

    let older = app.register(None).await;
    let newer = app.register(None).await;

    pending_checkout(
        &app,
        older.id,
        "shared@example.com",
        Some("cus_shared"),
        now - Duration::minutes(30),
        Duration::hours(24),
    )
    .await;
    let chosen = pending_checkout(
        &app,
        newer.id,
        "shared@example.com",
        Some("cus_shared"),
        now - Duration::minutes(5),
        Duration::hours(24),
    )
    .await;

    let resolution = resolver
        .resolve(&payer(Some("cus_shared"), None), now)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolution.account_id, newer.id);
    assert_eq!(resolution.checkout_id, Some(chosen));
    assert_eq!(
        resolution.tie_break,
        Some(TieBreak {
            candidates: 2,
            chosen_checkout: chosen,
        })
    );
}

#[tokio::test]
async fn test_tie_break_is_recorded_in_the_audit_trail() {
    let app = TestApp::new().await;
    let now = OffsetDateTime::now_utc();

    let older = app.register(None).await;
    let newer = app.register(None).await;
    for (account, age) in [(older.id, 20), (newer.id, 10)] {
        pending_checkout(
            &app,
            account,
            "family@example.com",
            None,
            now - Duration::minutes(age),
            Duration::hours(24),
        )
        .await;
    }

    let order = processor_event(
        "order_created",
        "ord_shared",
        json!({ "user_email": "family@example.com", "variant_id": "10_turns" }),
        None,
    );
    let outcome = app.deliver(&order).await;

    assert!(matches!(
        outcome,
        IngestOutcome::Credited { account_id, .. } if account_id == newer.id
    ));

    let audit = app.audit_rows().await;
    let tie_break = &audit[0].detail.as_ref().unwrap()["tieBreak"];
    assert_eq!(tie_break["rule"], TieBreak::RULE);
    assert_eq!(tie_break["candidates"], 2);
    assert!(app.ledger(older.id).await.is_empty());
}
