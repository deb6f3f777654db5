use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    services::jwt_service::JWTService,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Request extension storing the verified account from the bearer token
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    pub account_id: Uuid,
}

/// JWT authentication middleware
///
/// Validates the bearer token and stores the account identity in request
/// extensions. Returns 401 if the header is missing or validation fails.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized(
            "Invalid Authorization format, expected 'Bearer <token>'".to_string(),
        )
    })?;

    let claims = state.jwt_service.validate_token(token)?;
    let account_id = JWTService::account_id_from_claims(&claims)?;

    request.extensions_mut().insert(AccountIdentity { account_id });

    Ok(next.run(request).await)
}

/// Only works on routes protected by jwt_auth_middleware
impl<S> FromRequestParts<S> for AccountIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccountIdentity>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "Account identity not found - route must be protected by jwt_auth_middleware"
                        .to_string(),
                )
            })
    }
}
