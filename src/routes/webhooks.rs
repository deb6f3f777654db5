use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    app_state::AppState, error::Result, services::reconciliation_service::IngestOutcome,
};

pub const SIGNATURE_HEADER: &str = "x-signature";

/// POST /api/v1/webhooks/processor
///
/// Every typed outcome is acknowledged with 200 so the processor stops
/// redelivering. Infrastructure errors surface as 5xx and get retried.
#[instrument(skip(state, headers, body))]
pub async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .reconciliation_service
        .ingest_processor_event(&body, signature)
        .await?;

    // Senders of unsigned payloads learn nothing about how they were handled
    if outcome == IngestOutcome::SignatureInvalid {
        return Ok(Json(json!({ "received": true })));
    }

    Ok(Json(json!({
        "received": true,
        "outcome": outcome.label(),
    })))
}
