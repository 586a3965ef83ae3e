//! Validation of platform-issued user tokens

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a platform-issued user token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user ID as string, parsed to UUID downstream)
    pub sub: String,
    /// Email, when the auth service knows it
    pub email: Option<String>,
    /// Role (authenticated, anon, etc.)
    pub role: Option<String>,
    /// Audience
    pub aud: Option<String>,
    /// Issued at
    pub iat: Option<i64>,
    /// Expiration
    pub exp: i64,
}

/// Validates bearer tokens issued by the platform auth service
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate and decode a token.
    ///
    /// Explicit algorithm and audience validation; the auth service issues
    /// user tokens with audience `authenticated`.
    pub fn validate_token(&self, token: &str) -> Result<UserClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance
        validation.set_audience(&["authenticated"]);

        decode::<UserClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    tracing::warn!("JWT audience validation failed, rejecting token");
                    JwtError::Invalid
                }
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    const SECRET: &str = "test-secret-key-at-least-32-chars!!";

    fn issue(aud: &str, exp_offset: Duration, email: Option<&str>) -> String {
        let now = OffsetDateTime::now_utc();
        let claims = UserClaims {
            sub: Uuid::new_v4().to_string(),
            email: email.map(str::to_string),
            role: Some("authenticated".to_string()),
            aud: Some(aud.to_string()),
            iat: Some(now.unix_timestamp()),
            exp: (now + exp_offset).unix_timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_passes() {
        let manager = JwtManager::new(SECRET);
        let token = issue("authenticated", Duration::hours(1), Some("jane@x.com"));

        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.email.as_deref(), Some("jane@x.com"));
        assert!(Uuid::parse_str(&claims.sub).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(SECRET);
        let token = issue("authenticated", Duration::hours(-2), None);

        assert!(matches!(
            manager.validate_token(&token),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let manager = JwtManager::new(SECRET);
        let token = issue("anon", Duration::hours(1), None);

        assert!(matches!(
            manager.validate_token(&token),
            Err(JwtError::Invalid)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new("another-secret-key-also-32-chars!!!");
        let token = issue("authenticated", Duration::hours(1), None);

        assert!(manager.validate_token(&token).is_err());
    }
}
