use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Paths whose request bodies carry payer details and are logged by digest only
const REDACTED_PREFIXES: &[&str] = &["/api/v1/webhooks/"];

const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_LOGGED_CHARS: usize = 2000;

/// Middleware that logs request and response bodies
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    let request_body = loggable_body(uri.path(), &bytes);

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body = %request_body,
        "→ Request"
    );

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    let response_body = truncate_body(&String::from_utf8_lossy(&bytes), MAX_LOGGED_CHARS);
    let latency = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        body = %response_body,
        "← Response"
    );

    Response::from_parts(parts, Body::from(bytes))
}

fn loggable_body(path: &str, bytes: &[u8]) -> String {
    if REDACTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        format!(
            "[redacted, {} bytes, sha256={}]",
            bytes.len(),
            hex::encode(Sha256::digest(bytes))
        )
    } else {
        truncate_body(&String::from_utf8_lossy(bytes), MAX_LOGGED_CHARS)
    }
}

/// Truncate body for logging, adding ellipsis if truncated
fn truncate_body(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max_chars) {
        None => body.to_string(),
        Some((cut, _)) => format!(
            "{}...[truncated, {} bytes total]",
            &body[..cut],
            body.len()
        ),
    }
}
