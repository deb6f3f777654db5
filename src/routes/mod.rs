// Route modules
pub mod checkouts;
pub mod payments;
pub mod turns;
pub mod webhooks;

use crate::{
    app_state::AppState,
    middleware::{jwt_auth_middleware, logging_middleware},
};
use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Account routes, bearer token required
    let account_routes = Router::new()
        .route("/turns/consume", post(turns::consume_turn))
        .route("/turns/balance", get(turns::get_balance))
        .route("/turns/history", get(turns::get_history))
        .route("/payments/blockchain", post(payments::submit_blockchain_payment))
        .route(
            "/checkouts",
            post(checkouts::create_checkout).get(checkouts::list_checkouts),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Authenticated by payload signature instead of a bearer token
    let webhook_routes =
        Router::new().route("/webhooks/processor", post(webhooks::processor_webhook));

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(account_routes)
        .merge(webhook_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::from_fn(logging_middleware))
}
