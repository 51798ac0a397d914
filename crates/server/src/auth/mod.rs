//! Bearer token issuing and verification.
//!
//! Access and refresh tokens carry the same `{userId, email}` payload but are
//! bound to different audiences, so one can never stand in for the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::{parse_lifetime, AuthConfig};

pub mod microsoft;

pub const ISSUER: &str = "whattime-api";
pub const ACCESS_AUDIENCE: &str = "whattime-client";
pub const REFRESH_AUDIENCE: &str = "whattime-refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Access,
    Refresh,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Access => ACCESS_AUDIENCE,
            Audience::Refresh => REFRESH_AUDIENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Malformed token")]
    Malformed,
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Subject of a token: who it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: String,
    pub email: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        if config.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT secret is required");
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: parse_lifetime(&config.access_token_expiry)?,
            refresh_ttl: parse_lifetime(&config.refresh_token_expiry)?,
        })
    }

    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, Audience::Access, self.access_ttl)
    }

    pub fn issue_refresh_token(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, Audience::Refresh, self.refresh_ttl)
    }

    fn issue(
        &self,
        subject: &TokenSubject,
        audience: Audience,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: subject.user_id.clone(),
            email: subject.email.clone(),
            iss: ISSUER.to_string(),
            aud: audience.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str, audience: Audience) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed,
                _ => TokenError::Invalid,
            })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
