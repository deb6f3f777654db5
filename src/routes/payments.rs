use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::AccountIdentity,
    models::{
        blockchain::{BlockchainClaimRequest, ClaimOutcome, ClaimResponse},
        common::SuccessResponse,
    },
};

/// POST /api/v1/payments/blockchain
#[instrument(skip(state, request), fields(account_id = %identity.account_id))]
pub async fn submit_blockchain_payment(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<BlockchainClaimRequest>,
) -> Result<(StatusCode, Json<ClaimResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let outcome = state
        .reconciliation_service
        .ingest_blockchain_claim(
            identity.account_id,
            &request.tx_hash,
            request.amount,
            &request.sender,
            &request.variant,
        )
        .await?;

    let status = match &outcome {
        ClaimOutcome::Credited { .. } | ClaimOutcome::AlreadyProcessed => StatusCode::OK,
        ClaimOutcome::VerificationFailed {
            transient: true, ..
        } => StatusCode::ACCEPTED,
        ClaimOutcome::VerificationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };

    Ok((status, Json(SuccessResponse::new(outcome.into()))))
}
