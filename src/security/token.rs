//! Session token issuance and verification.
//!
//! Tokens are HS256-signed JWTs carrying the identity id as the `sub` claim
//! together with `iss`, `aud`, `iat`, `nbf` and `exp`. They are stateless:
//! validity depends only on the signature and the expiry at verification
//! time. Verification never consults storage; whether the subject still
//! exists is decided by the caller.

use crate::config::TokenConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Session token failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are malformed")]
    MalformedClaims,
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize)]
struct SessionClaims<'a> {
    sub: String,
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    nbf: i64,
    exp: i64,
}

/// Only the subject is read back; `iss`/`aud`/`exp` are checked by the
/// validator. Any JSON shape is accepted here so that claim problems are
/// reported after expiry.
#[derive(Debug, Deserialize)]
struct SubjectClaim {
    #[serde(default)]
    sub: Option<serde_json::Value>,
}

/// Issues and verifies signed session tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    validity: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build the service from configuration.
    ///
    /// Fails with `MissingSecret` when no signing secret is configured.
    pub fn new(config: &TokenConfig) -> Result<Self, TokenError> {
        if config.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let secret = config.secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            validity: config.validity(),
        })
    }

    /// Token lifetime from issuance.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token for `subject`, valid from now.
    pub fn issue(&self, subject: i64) -> Result<String, TokenError> {
        self.issue_at(subject, chrono::Utc::now().timestamp())
    }

    /// Issue a token for `subject` as if issued at `issued_at` (unix seconds).
    pub fn issue_at(&self, subject: i64, issued_at: i64) -> Result<String, TokenError> {
        let validity = i64::try_from(self.validity.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: subject.to_string(),
            iss: &self.issuer,
            aud: &self.audience,
            iat: issued_at,
            nbf: issued_at,
            exp: issued_at.saturating_add(validity),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its subject identifier.
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        let data = jsonwebtoken::decode::<SubjectClaim>(token, &self.decoding, &self.validation)
            .map_err(classify)?;
        parse_subject(data.claims.sub.as_ref())
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Json(_) => TokenError::MalformedClaims,
        _ => TokenError::InvalidSignature,
    }
}

/// Accept a positive integer subject given as a JSON string or number.
fn parse_subject(sub: Option<&serde_json::Value>) -> Result<i64, TokenError> {
    let id = match sub {
        Some(serde_json::Value::String(s)) => s.parse::<i64>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    };
    id.filter(|id| *id > 0).ok_or(TokenError::MalformedClaims)
}
