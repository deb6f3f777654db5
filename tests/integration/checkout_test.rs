use crate::common::TestApp;
use time::{Duration, OffsetDateTime};
use turnledger::{error::ApiError, models::checkout::CheckoutStatus};
use uuid::Uuid;

#[tokio::test]
async fn test_create_checkout_snapshots_email_and_ttl() {
    let app = TestApp::new().await;
    let account = app.register(Some("  Buyer@Example.com ")).await;

    let checkout = app
        .state
        .checkout_service
        .create_checkout(account.id, "50_turns", Some("chk_123"))
        .await
        .unwrap();

    assert_eq!(checkout.account_id, account.id);
    assert_eq!(checkout.account_email_snapshot, "buyer@example.com");
    assert_eq!(checkout.checkout_id.as_deref(), Some("chk_123"));
    assert_eq!(checkout.status, CheckoutStatus::Pending.as_str());
    assert_eq!(checkout.expires_at - checkout.created_at, Duration::hours(24));

    let listed = app
        .state
        .checkout_service
        .list_for_account(account.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, checkout.id);
}

#[tokio::test]
async fn test_create_checkout_rejects_bad_input() {
    let app = TestApp::new().await;
    let no_email = app.register(None).await;
    let with_email = app.register(Some("x@example.com")).await;
    let checkouts = &app.state.checkout_service;

    assert!(matches!(
        checkouts.create_checkout(no_email.id, "10_turns", None).await,
        Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
        checkouts.create_checkout(with_email.id, "nope", None).await,
        Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
        checkouts
            .create_checkout(Uuid::new_v4(), "10_turns", None)
            .await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_expire_stale_only_touches_overdue_pending_checkouts() {
    let app = TestApp::new().await;
    let account = app.register(Some("sweep@example.com")).await;
    let checkouts = &app.state.checkout_service;

    let checkout = checkouts
        .create_checkout(account.id, "10_turns", None)
        .await
        .unwrap();

    let now = OffsetDateTime::now_utc();
    assert_eq!(checkouts.expire_stale(now).await.unwrap(), 0);

    let later = now + Duration::hours(25);
    assert_eq!(checkouts.expire_stale(later).await.unwrap(), 1);
    assert_eq!(checkouts.expire_stale(later).await.unwrap(), 0);

    let listed = checkouts.list_for_account(account.id).await.unwrap();
    assert_eq!(listed[0].id, checkout.id);
    assert_eq!(listed[0].status, CheckoutStatus::Expired.as_str());
}
