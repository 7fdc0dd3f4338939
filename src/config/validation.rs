//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early. Every
//! error reported here is fatal to the process.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Minimum HMAC secret length in bytes for HS256 signing.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("auth.token.secret is required")]
    MissingTokenSecret,
    #[error("auth.token.secret must be at least {MIN_TOKEN_SECRET_LEN} bytes, got {0}")]
    WeakTokenSecret(usize),
    #[error("auth.token.issuer and auth.token.audience must not be empty")]
    MissingTokenClaims,
    #[error("auth.token.validity_secs must be greater than zero")]
    ZeroTokenValidity,
    #[error("auth.basic.username and auth.basic.password are required")]
    MissingOperatorCredentials,
    #[error("invitations.validity_secs must be greater than zero")]
    ZeroInvitationValidity,
    #[error("rate_limiter.requests_per_frame must be greater than zero")]
    ZeroRequestsPerFrame,
    #[error("rate_limiter.frame_secs must be greater than zero")]
    ZeroFrame,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let token = &config.auth.token;
    if token.secret.is_empty() {
        errors.push(ValidationError::MissingTokenSecret);
    } else if token.secret.len() < MIN_TOKEN_SECRET_LEN {
        errors.push(ValidationError::WeakTokenSecret(token.secret.len()));
    }
    if token.issuer.is_empty() || token.audience.is_empty() {
        errors.push(ValidationError::MissingTokenClaims);
    }
    if token.validity_secs == 0 {
        errors.push(ValidationError::ZeroTokenValidity);
    }

    let basic = &config.auth.basic;
    if basic.username.is_empty() || basic.password.is_empty() {
        errors.push(ValidationError::MissingOperatorCredentials);
    }

    if config.invitations.validity_secs == 0 {
        errors.push(ValidationError::ZeroInvitationValidity);
    }

    let limiter = &config.rate_limiter;
    if limiter.enabled {
        if limiter.requests_per_frame == 0 {
            errors.push(ValidationError::ZeroRequestsPerFrame);
        }
        if limiter.frame_secs == 0 {
            errors.push(ValidationError::ZeroFrame);
        }
    }

    if config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(
                config.database.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
