use crate::common::{
    processor_event, tx_ref, TestApp, JWT_SECRET, SENDER, TEN_TURNS_WEI, WEBHOOK_SECRET,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use turnledger::{
    routes::{create_router, webhooks::SIGNATURE_HEADER},
    services::{jwt_service::Claims, webhook_signature::WebhookSignatureVerifier},
};
use uuid::Uuid;

fn bearer(account_id: Uuid) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims {
        sub: account_id.to_string(),
        iat: now,
        exp: now + 3600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, account_id: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, bearer(account_id))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, account_id: Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(account_id))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_account_routes_require_a_bearer_token() {
    let app = TestApp::new().await;
    let router = create_router(app.state.clone());

    let request = Request::builder()
        .uri("/api/v1/turns/balance")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let forged = Request::builder()
        .uri("/api/v1/turns/balance")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_free_turns_run_out_after_three_uses() {
    let app = TestApp::new().await;
    let account = app.register(None).await;
    let router = create_router(app.state.clone());

    for remaining in [2, 1, 0] {
        let (status, body) = send(
            &router,
            post_json("/api/v1/turns/consume", account.id, json!({ "feature": "chat" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], true);
        assert_eq!(body["data"]["remainingFree"], remaining);
        assert_eq!(body["data"]["kindConsumed"], "free");
    }

    let (status, body) = send(
        &router,
        post_json("/api/v1/turns/consume", account.id, json!({ "feature": "chat" })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["data"]["success"], false);
    assert_eq!(body["data"]["remainingTotal"], 0);
    assert_eq!(body["data"]["message"], "no turns remaining");

    let (status, body) = send(&router, get("/api/v1/turns/balance", account.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "free": 0, "paid": 0, "total": 0, "unlimited": false }));

    let (_, body) = send(&router, get("/api/v1/turns/history?kind=debit&limit=2", account.id)).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["sequence"], 4);
    assert_eq!(entries[0]["amount"], 0);
}

#[tokio::test]
async fn test_consume_rejects_an_empty_feature() {
    let app = TestApp::new().await;
    let account = app.register(None).await;
    let router = create_router(app.state.clone());

    let (status, body) = send(
        &router,
        post_json("/api/v1/turns/consume", account.id, json!({ "feature": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(app.ledger(account.id).await.is_empty());
}

#[tokio::test]
async fn test_webhook_acknowledges_every_typed_outcome() {
    let app = TestApp::new().await;
    let account = app.register(None).await;
    let router = create_router(app.state.clone());

    let raw = processor_event(
        "order_created",
        "ord_http",
        json!({ "variant_id": "10_turns" }),
        Some(account.id),
    )
    .to_string();
    let signature = WebhookSignatureVerifier::new(WEBHOOK_SECRET).sign(raw.as_bytes());

    let webhook = |signature: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/processor")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(raw.clone())).unwrap()
    };

    let (status, body) = send(&router, webhook(Some(signature.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true, "outcome": "credited" }));

    let (status, body) = send(&router, webhook(Some(signature.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (status, body) = send(&router, webhook(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    assert_eq!(app.entitlement(account.id).await.paid_turns, 10);
}

#[tokio::test]
async fn test_blockchain_claim_status_codes() {
    let app = TestApp::new().await;
    let account = app.register(None).await;
    let router = create_router(app.state.clone());
    app.chain.set_head(101);
    app.chain.add_transfer(&tx_ref(1), SENDER, TEN_TURNS_WEI, 100);

    let claim = |amount: &str| {
        post_json(
            "/api/v1/payments/blockchain",
            account.id,
            json!({
                "txHash": tx_ref(1),
                "amount": amount,
                "sender": SENDER,
                "variant": "10_turns",
            }),
        )
    };

    let (status, body) = send(&router, claim("0.0015")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"]["outcome"]["status"], "verification_failed");
    assert_eq!(body["data"]["outcome"]["reason"]["code"], "amount_mismatch");
    assert_eq!(body["data"]["outcome"]["transient"], false);

    let (status, body) = send(&router, claim("0.0016")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["outcome"]["reason"]["code"], "not_yet_confirmed");
    assert_eq!(body["data"]["message"], "not yet confirmed, please retry shortly");

    app.chain.set_head(110);
    let (status, body) = send(&router, claim("0.0016")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["status"], "credited");
    assert_eq!(body["data"]["outcome"]["balance_after"], 13);

    let (status, body) = send(&router, claim("0.0016")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["status"], "already_processed");
}

#[tokio::test]
async fn test_checkout_routes() {
    let app = TestApp::new().await;
    let account = app.register(Some("api@example.com")).await;
    let router = create_router(app.state.clone());

    let (status, body) = send(
        &router,
        post_json(
            "/api/v1/checkouts",
            account.id,
            json!({ "variant": "10_turns", "checkoutId": "chk_api" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["checkoutId"], "chk_api");

    let (status, body) = send(&router, get("/api/v1/checkouts", account.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
