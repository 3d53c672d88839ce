use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Access tokens live for seven days.
pub const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    User,
    Admin,
}

impl TokenRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: TokenRole,
    pub exp: i64,
}

/// Sign an HS256 access token for `sub`.
pub fn issue_token(secret: &str, sub: &str, role: TokenRole) -> Result<String, AuthError> {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        exp: chrono::Utc::now().timestamp() + TOKEN_TTL_SECS,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenEncoding(e.to_string()))
}

/// Verify signature and expiry, then require the expected role.
pub fn decode_token(secret: &str, token: &str, expected: TokenRole) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;
    if data.claims.role != expected {
        return Err(AuthError::WrongRole {
            expected: expected.as_str().into(),
            actual: data.claims.role.as_str().into(),
        });
    }
    Ok(data.claims)
}
