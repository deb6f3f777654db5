use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::AccountIdentity,
    models::{
        common::SuccessResponse,
        consumption::{ConsumeResponse, UsageContext},
        entitlement::BalanceSnapshot,
        ledger::{HistoryFilter, LedgerEntryView},
    },
};

/// POST /api/v1/turns/consume
#[instrument(skip(state, request), fields(account_id = %identity.account_id))]
pub async fn consume_turn(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<UsageContext>,
) -> Result<(StatusCode, Json<ConsumeResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let result = state
        .consumption_service
        .consume(identity.account_id, &request)
        .await?;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::PAYMENT_REQUIRED
    };

    Ok((status, Json(SuccessResponse::new(result.into()))))
}

/// GET /api/v1/turns/balance
#[instrument(skip(state, identity))]
pub async fn get_balance(
    State(state): State<AppState>,
    identity: AccountIdentity,
) -> Result<Json<SuccessResponse<BalanceSnapshot>>> {
    let balance = state
        .consumption_service
        .get_balance(identity.account_id)
        .await?;

    Ok(Json(SuccessResponse::new(balance)))
}

/// GET /api/v1/turns/history
#[instrument(skip(state, identity))]
pub async fn get_history(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<SuccessResponse<Vec<LedgerEntryView>>>> {
    let entries = state
        .ledger_service
        .history(identity.account_id, &filter)
        .await?;

    Ok(Json(SuccessResponse::new(
        entries.into_iter().map(LedgerEntryView::from).collect(),
    )))
}
