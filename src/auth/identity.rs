//! Token-based request identity
//!
//! Tokens are HS256 JWTs whose `user_id` claim carries the hex object id
//! of the caller. Every engine operation takes the resulting
//! [`RequestIdentity`]; nothing downstream trusts an id from the body.

use bson::oid::ObjectId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{parse_object_id, LedgerError, Result};

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_id: ObjectId,
}

impl RequestIdentity {
    pub fn new(user_id: ObjectId) -> Self {
        Self { user_id }
    }
}

/// Payload stored in the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Hex object id of the user
    pub user_id: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Verifies caller tokens and, for tooling, issues them
#[derive(Clone)]
pub struct IdentityVerifier {
    secret: String,
    expiry_seconds: u64,
}

impl IdentityVerifier {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(LedgerError::Config(
                "JWT_SECRET is required outside dev mode".into(),
            ));
        }
        if secret.len() < 32 {
            return Err(LedgerError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }
        Ok(Self {
            secret,
            expiry_seconds: 3600,
        })
    }

    /// Verifier for dev mode (fixed secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn with_expiry(mut self, expiry_seconds: u64) -> Self {
        self.expiry_seconds = expiry_seconds;
        self
    }

    /// Issue a token for `user_id`
    pub fn issue(&self, user_id: &ObjectId) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| LedgerError::Config(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: user_id.to_hex(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Verify a token and resolve the caller
    pub fn verify(&self, token: &str) -> Result<RequestIdentity> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "invalid signature",
                _ => "invalid token",
            };
            LedgerError::unauthorized(msg)
        })?;

        let user_id = parse_object_id(&data.claims.user_id, "user_id")
            .map_err(|_| LedgerError::unauthorized("token does not name a user"))?;
        Ok(RequestIdentity::new(user_id))
    }
}

/// Extract token from an Authorization header.
/// Supports "Bearer <token>" and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;

    const SECRET: &str = "test-secret-that-is-long-enough-32";

    #[test]
    fn test_short_secret_rejected() {
        assert!(IdentityVerifier::new("").is_err());
        assert!(IdentityVerifier::new("short").is_err());
        assert!(IdentityVerifier::new(SECRET).is_ok());
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = IdentityVerifier::new(SECRET).unwrap();
        let user = ObjectId::new();
        let token = verifier.issue(&user).unwrap();

        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.user_id, user);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = IdentityVerifier::new_dev().issue(&ObjectId::new()).unwrap();
        let verifier = IdentityVerifier::new(SECRET).unwrap();

        let err = verifier.verify(&token).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
        assert!(verifier.verify("not.a.token").is_err());
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims {
            user_id: ObjectId::new().to_hex(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let verifier = IdentityVerifier::new(SECRET).unwrap().with_expiry(60);
        let err = verifier.verify(&token).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: token expired");
    }

    #[test]
    fn test_claim_must_be_object_id() {
        let claims = Claims {
            user_id: "someone@example.com".into(),
            iat: 0,
            exp: 4_102_444_800,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = IdentityVerifier::new(SECRET).unwrap().verify(&token).unwrap_err();
        assert!(err.to_string().contains("does not name a user"));
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
