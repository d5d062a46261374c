use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

/// JWT claims shared by the REST middleware and the relay handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing bearer token")]
    Missing,
    #[error("invalid or expired token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

pub fn issue_token(
    secret: &str,
    account_id: Uuid,
    role: Role,
    ttl: Duration,
) -> Result<String, TokenError> {
    let claims = Claims {
        sub: account_id,
        role,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, TokenError> {
    if token.is_empty() {
        return Err(TokenError::Missing);
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let id = Uuid::new_v4();
        let token = issue_token("s3cret", id, Role::Seller, Duration::hours(1)).unwrap();
        let claims = verify_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Seller);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("one", Uuid::new_v4(), Role::User, Duration::hours(1)).unwrap();
        assert!(matches!(verify_token("two", &token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("s", Uuid::new_v4(), Role::User, Duration::hours(-2)).unwrap();
        assert!(verify_token("s", &token).is_err());
    }

    #[test]
    fn empty_token_is_missing() {
        assert!(matches!(verify_token("s", ""), Err(TokenError::Missing)));
    }
}
