use crate::errors::BackendError;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (account ID)
    pub sid: String, // Session ID
    pub email: String,
    pub exp: usize,
}

/// Signs a session token valid for `ttl`. Returns the token and its expiry.
pub fn create_token(
    account_id: &str,
    session_id: &str,
    email: &str,
    secret: &str,
    ttl: Duration,
) -> Result<(String, DateTime<Utc>), BackendError> {
    let expires_at = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| BackendError::Internal("Failed to calculate expiration".into()))?;

    let claims = Claims {
        sub: account_id.to_string(),
        sid: session_id.to_string(),
        email: email.to_string(),
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| BackendError::Internal(format!("Token Creation failed: {}", e)))?;

    Ok((token, expires_at))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, BackendError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| BackendError::Unauthorized)
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, BackendError> {
    hash(password, cost).map_err(|e| BackendError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hashed: &str) -> Result<bool, BackendError> {
    verify(password, hashed)
        .map_err(|e| BackendError::Internal(format!("Password verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_claims() {
        let (token, expires_at) =
            create_token("acc-1", "sess-1", "a@b.sk", "secret", Duration::hours(1)).unwrap();
        let claims = validate_token(&token, "secret").unwrap();

        assert_eq!(claims.sub, "acc-1");
        assert_eq!(claims.sid, "sess-1");
        assert_eq!(claims.exp, expires_at.timestamp() as usize);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (token, _) =
            create_token("acc-1", "sess-1", "a@b.sk", "secret", Duration::hours(1)).unwrap();

        assert_eq!(
            validate_token(&token, "other").unwrap_err(),
            BackendError::Unauthorized
        );
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("password123", 4).unwrap();
        assert!(verify_password("password123", &hashed).unwrap());
        assert!(!verify_password("password124", &hashed).unwrap());
    }
}
