use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::domain::{AdminId, AdminRole};

const PASSWORD_RESET_TTL_HOURS: i64 = 1;

/// What a token may be used for. Tokens are only accepted for their own purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    #[default]
    Session,
    PasswordReset,
}

/// Claims carried by an admin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: AdminRole,
    #[serde(default)]
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Issues and verifies HS256 admin tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    reset_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .field("reset_ttl", &self.reset_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Session tokens live for `ttl`; password reset tokens for one hour.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            reset_ttl: Duration::hours(PASSWORD_RESET_TTL_HOURS),
        }
    }

    pub fn with_reset_ttl(mut self, reset_ttl: Duration) -> Self {
        self.reset_ttl = reset_ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn reset_ttl(&self) -> Duration {
        self.reset_ttl
    }

    pub fn issue(&self, admin_id: AdminId, role: AdminRole) -> Result<String, TokenError> {
        self.sign(admin_id, role, TokenPurpose::Session, self.ttl)
    }

    pub fn issue_password_reset(
        &self,
        admin_id: AdminId,
        role: AdminRole,
    ) -> Result<String, TokenError> {
        self.sign(admin_id, role, TokenPurpose::PasswordReset, self.reset_ttl)
    }

    /// Verify a session token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_for(token, TokenPurpose::Session)
    }

    pub fn verify_password_reset(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_for(token, TokenPurpose::PasswordReset)
    }

    fn sign(
        &self,
        admin_id: AdminId,
        role: AdminRole,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: admin_id.to_string(),
            role,
            purpose,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| TokenError::Invalid(error.to_string()))
    }

    fn verify_for(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(error.to_string()),
            })?;
        if claims.purpose != purpose {
            return Err(TokenError::Invalid(format!(
                "token issued for {:?}, expected {purpose:?}",
                claims.purpose
            )));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(b"test-secret-key-for-testing-only", ttl)
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let issuer = issuer(Duration::hours(1));
        let admin_id = AdminId::generate();
        let token = issuer.issue(admin_id, AdminRole::SuperAdmin).expect("token");

        let claims = issuer.verify(&token).expect("valid token");
        assert_eq!(claims.sub, admin_id.to_string());
        assert_eq!(claims.role, AdminRole::SuperAdmin);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let issuer = issuer(Duration::hours(-2));
        let token = issuer
            .issue(AdminId::generate(), AdminRole::Admin)
            .expect("token");
        assert_eq!(issuer.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn session_and_reset_tokens_are_not_interchangeable() {
        let issuer = issuer(Duration::hours(24));
        let admin_id = AdminId::generate();
        let session = issuer.issue(admin_id, AdminRole::Admin).expect("token");
        let reset = issuer
            .issue_password_reset(admin_id, AdminRole::Admin)
            .expect("token");

        assert!(matches!(issuer.verify(&reset), Err(TokenError::Invalid(_))));
        assert!(matches!(
            issuer.verify_password_reset(&session),
            Err(TokenError::Invalid(_))
        ));

        let claims = issuer.verify_password_reset(&reset).expect("reset token");
        assert_eq!(claims.purpose, TokenPurpose::PasswordReset);
        assert!(claims.exp - claims.iat <= 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = TokenIssuer::new(b"another-secret", Duration::hours(1))
            .issue(AdminId::generate(), AdminRole::Admin)
            .expect("token");
        assert!(matches!(
            issuer(Duration::hours(1)).verify(&token),
            Err(TokenError::Invalid(_))
        ));
    }
}
