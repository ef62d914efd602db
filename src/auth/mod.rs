pub mod session;

use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::org::OrgId;

pub use session::{session_key, SessionError, SessionStore, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub org_id: OrgId,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
}

/// Issues and verifies HMAC-signed tokens.
pub struct TokenCodec {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, algorithm: &str, expiry: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }
        let algorithm = Algorithm::from_str(algorithm)
            .ok()
            .filter(|a| matches!(a, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .ok_or_else(|| TokenError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            header: Header::new(algorithm),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry,
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, TokenError> {
        Self::new(
            &config.jwt_secret,
            &config.jwt_algorithm,
            Duration::minutes(config.jwt_expiry_minutes as i64),
        )
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Claims for a new token valid for the configured expiry.
    pub fn claims(&self, sub: impl Into<String>, org_id: OrgId, name: impl Into<String>) -> Claims {
        let now = Utc::now();
        Claims {
            sub: sub.into(),
            org_id,
            name: name.into(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        }
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| TokenError::TokenGeneration(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                _ => TokenError::InvalidToken,
            })
    }
}
