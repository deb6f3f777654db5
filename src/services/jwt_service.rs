use crate::{
    config::AuthConfig,
    error::{ApiError, Result},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token claims issued by the external auth service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (account_id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Validates bearer tokens; issuing them is the auth service's job
pub struct JWTService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JWTService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token expired".to_string())
                }
                _ => ApiError::Unauthorized(format!("Invalid token: {}", e)),
            })?;

        Ok(token_data.claims)
    }

    /// Extract account_id from claims
    pub fn account_id_from_claims(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.sub)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid account id in token: {}", e)))
    }
}
