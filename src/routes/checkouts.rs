use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::AccountIdentity,
    models::{
        checkout::{CheckoutView, CreateCheckoutRequest},
        common::SuccessResponse,
    },
};

/// POST /api/v1/checkouts
#[instrument(skip(state, request), fields(account_id = %identity.account_id))]
pub async fn create_checkout(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<CheckoutView>>)> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let checkout = state
        .checkout_service
        .create_checkout(
            identity.account_id,
            &request.variant,
            request.checkout_id.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(checkout.into()))))
}

/// GET /api/v1/checkouts
#[instrument(skip(state, identity))]
pub async fn list_checkouts(
    State(state): State<AppState>,
    identity: AccountIdentity,
) -> Result<Json<SuccessResponse<Vec<CheckoutView>>>> {
    let checkouts = state
        .checkout_service
        .list_for_account(identity.account_id)
        .await?;

    Ok(Json(SuccessResponse::new(
        checkouts.into_iter().map(CheckoutView::from).collect(),
    )))
}
