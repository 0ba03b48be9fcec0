//! services/api/src/security/jwt.rs
//!
//! Issues and verifies the signed access and refresh credentials.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use reading_practice_core::{Role, User};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::ApiError;

/// Reasons a credential fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credential expired")]
    Expired,
    #[error("credential not yet valid")]
    NotYetValid,
    #[error("credential malformed")]
    Malformed,
}

/// The claims embedded in every credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, CredentialError> {
        Uuid::parse_str(&self.sub).map_err(|_| CredentialError::Malformed)
    }

    pub fn role(&self) -> Result<Role, CredentialError> {
        Role::from_str(&self.role).map_err(|_| CredentialError::Malformed)
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Signs and checks credentials with one shared HS256 secret.
#[derive(Clone)]
pub struct CredentialIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    refresh_audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            refresh_audience: format!("{}:refresh", config.audience),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn access_audience(&self) -> &str {
        &self.audience
    }

    pub fn refresh_audience(&self) -> &str {
        &self.refresh_audience
    }

    /// Produces a fresh access/refresh pair for `user`.
    pub fn issue(&self, user: &User) -> Result<TokenPair, ApiError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.sign(user, &self.audience, now, self.access_ttl)?,
            refresh_token: self.sign(user, &self.refresh_audience, now, self.refresh_ttl)?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn issue_access(&self, user: &User) -> Result<String, ApiError> {
        self.sign(user, &self.audience, Utc::now(), self.access_ttl)
    }

    /// Signs a token valid from `issued_at` for `ttl`.
    pub fn sign(
        &self,
        user: &User,
        audience: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign credential: {}", e)))
    }

    /// Checks signature, issuer, audience and time claims with zero leeway.
    pub fn verify(&self, token: &str, expected_audience: &str) -> Result<Claims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Credential rejected: {:?}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => CredentialError::Expired,
                    ErrorKind::ImmatureSignature => CredentialError::NotYetValid,
                    _ => CredentialError::Malformed,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reading_practice_core::Level;

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(&JwtConfig {
            secret: "test-secret".into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(30),
            issuer: "reading-practice-api".into(),
            audience: "reading-practice-app".into(),
        })
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "emma@student.test".into(),
            name: "Emma".into(),
            role: Role::Student,
            level: Level::Beginner,
            class_id: Some("CM2-A".into()),
            avatar: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_pair_verifies_against_its_own_audience() {
        let issuer = issuer();
        let user = user();
        let pair = issuer.issue(&user).unwrap();

        let claims = issuer.verify(&pair.access_token, issuer.access_audience()).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.role().unwrap(), Role::Student);
        assert_eq!(claims.email, user.email);
        assert_eq!(pair.expires_in, 15 * 60);

        assert!(issuer.verify(&pair.refresh_token, issuer.refresh_audience()).is_ok());
    }

    #[test]
    fn audiences_do_not_cross() {
        let issuer = issuer();
        let pair = issuer.issue(&user()).unwrap();
        assert_eq!(
            issuer.verify(&pair.refresh_token, issuer.access_audience()),
            Err(CredentialError::Malformed)
        );
        assert_eq!(
            issuer.verify(&pair.access_token, issuer.refresh_audience()),
            Err(CredentialError::Malformed)
        );
    }

    #[test]
    fn past_expiry_is_expired() {
        let issuer = issuer();
        let token = issuer
            .sign(
                &user(),
                issuer.access_audience(),
                Utc::now() - Duration::hours(2),
                Duration::hours(1),
            )
            .unwrap();
        assert_eq!(
            issuer.verify(&token, issuer.access_audience()),
            Err(CredentialError::Expired)
        );
    }

    #[test]
    fn future_issue_is_not_yet_valid() {
        let issuer = issuer();
        let token = issuer
            .sign(
                &user(),
                issuer.access_audience(),
                Utc::now() + Duration::hours(1),
                Duration::hours(1),
            )
            .unwrap();
        assert_eq!(
            issuer.verify(&token, issuer.access_audience()),
            Err(CredentialError::NotYetValid)
        );
    }

    #[test]
    fn garbage_and_foreign_signatures_are_malformed() {
        let issuer = issuer();
        assert_eq!(
            issuer.verify("not-a-token", issuer.access_audience()),
            Err(CredentialError::Malformed)
        );

        let foreign = CredentialIssuer::new(&JwtConfig {
            secret: "another-secret".into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(30),
            issuer: "reading-practice-api".into(),
            audience: "reading-practice-app".into(),
        });
        let token = foreign.issue_access(&user()).unwrap();
        assert_eq!(
            issuer.verify(&token, issuer.access_audience()),
            Err(CredentialError::Malformed)
        );
    }
}
