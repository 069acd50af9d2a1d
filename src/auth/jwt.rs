//! Bearer token issue and validation.

use crate::error::{AppError, AppResult};
use crate::models::{Identity, Role};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtSecret {
    secret: String,
}

impl JwtSecret {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn issue(&self, identity: &Identity) -> AppResult<String> {
        self.issue_with_ttl(identity, Duration::days(7))
    }

    pub fn issue_with_ttl(&self, identity: &Identity, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.user_id.clone(),
            role: identity.role,
            restaurant_id: identity.restaurant_id.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        Ok(token)
    }

    /// Verify signature and expiry, and derive the identity the token carries.
    pub fn validate(&self, token: &str) -> AppResult<Identity> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        if data.claims.sub.is_empty() {
            return Err(AppError::Jwt("empty subject".to_string()));
        }
        Ok(Identity {
            user_id: data.claims.sub,
            role: data.claims.role,
            restaurant_id: data.claims.restaurant_id,
        })
    }
}
