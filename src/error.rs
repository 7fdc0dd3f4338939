//! Unified error handling for socialgate.
//!
//! Every component returns its own typed error; [`AccessError`] is the
//! boundary taxonomy those errors convert into. It carries the HTTP status,
//! a static code for metrics labeling and a message that never includes
//! internal detail.

use crate::authz::AuthzError;
use crate::invitation::InvitationError;
use crate::mailer::MailError;
use crate::security::basic::{self, CredentialError};
use crate::security::TokenError;
use crate::session::LoginError;
use crate::store::StoreError;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

/// Authentication scheme that produced a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Bearer => "bearer",
        }
    }

    /// `WWW-Authenticate` challenge for this scheme.
    pub fn challenge(&self) -> String {
        match self {
            Self::Basic => basic::challenge(),
            Self::Bearer => "Bearer".to_string(),
        }
    }
}

// ============================================================================
// Boundary errors (request pipeline)
// ============================================================================

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("{scheme:?} authentication failed: {reason}")]
    Unauthorized {
        scheme: AuthScheme,
        reason: &'static str,
    },

    /// Token verified but its subject does not exist or is inactive.
    #[error("identity not found or inactive")]
    UnknownIdentity,

    #[error("invalid credentials")]
    InvalidLogin,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("email already exists")]
    DuplicateEmail,

    #[error("username already exists")]
    DuplicateUsername,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized { .. } | Self::UnknownIdentity | Self::InvalidLogin => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateEmail | Self::DuplicateUsername | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized { .. } => "unauthorized",
            Self::UnknownIdentity => "unknown_identity",
            Self::InvalidLogin => "invalid_login",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::DuplicateEmail => "duplicate_email",
            Self::DuplicateUsername => "duplicate_username",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to return to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimited { retry_after } => {
                format!("rate limit exceeded, retry after: {}s", retry_after_secs(*retry_after))
            }
            Self::Unauthorized { .. } | Self::UnknownIdentity => "unauthorized".to_string(),
            Self::InvalidLogin => "invalid email or password".to_string(),
            Self::Forbidden => "forbidden".to_string(),
            Self::NotFound => "not found".to_string(),
            Self::DuplicateEmail => "a user with that email already exists".to_string(),
            Self::DuplicateUsername => "a user with that username already exists".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Internal(_) => "the server encountered a problem and could not process your request".to_string(),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Whole seconds, rounded up, never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "request failed");
        }
        crate::metrics::record_request_error(self.error_code());

        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.public_message() }));
        let mut response = (status, body).into_response();

        let headers = response.headers_mut();
        match &self {
            Self::Unauthorized { scheme, .. } => {
                if let Ok(value) = HeaderValue::from_str(&scheme.challenge()) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            Self::UnknownIdentity => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::RateLimited { retry_after } => {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(*retry_after)),
                );
            }
            _ => {}
        }
        response
    }
}

// ============================================================================
// Conversions from component errors
// ============================================================================

impl From<CredentialError> for AccessError {
    fn from(err: CredentialError) -> Self {
        let reason = match err {
            CredentialError::MissingHeader => "missing_header",
            CredentialError::MalformedHeader => "malformed_header",
            CredentialError::InvalidCredentials => "invalid_credentials",
        };
        Self::Unauthorized {
            scheme: AuthScheme::Basic,
            reason,
        }
    }
}

impl From<TokenError> for AccessError {
    fn from(err: TokenError) -> Self {
        let reason = match err {
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::MalformedClaims => "malformed_claims",
            TokenError::MissingSecret | TokenError::Signing(_) => {
                return Self::Internal(err.to_string());
            }
        };
        Self::Unauthorized {
            scheme: AuthScheme::Bearer,
            reason,
        }
    }
}

impl From<InvitationError> for AccessError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::InvalidDraft(msg) => Self::InvalidInput(msg),
            InvitationError::DuplicateEmail => Self::DuplicateEmail,
            InvitationError::DuplicateUsername => Self::DuplicateUsername,
            InvitationError::NotFound => Self::NotFound,
            InvitationError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthzError> for AccessError {
    fn from(err: AuthzError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::DuplicateUsername => Self::DuplicateUsername,
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<LoginError> for AccessError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::InvalidCredentials | LoginError::Inactive => Self::InvalidLogin,
            LoginError::Token(e) => Self::Internal(e.to_string()),
            LoginError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<MailError> for AccessError {
    fn from(err: MailError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AccessError::RateLimited { retry_after: Duration::from_secs(1) }, 429),
            (CredentialError::MalformedHeader.into(), 401),
            (TokenError::Expired.into(), 401),
            (AccessError::UnknownIdentity, 401),
            (AccessError::Forbidden, 403),
            (InvitationError::NotFound.into(), 404),
            (InvitationError::DuplicateEmail.into(), 400),
            (AuthzError::UnknownRole("x".into()).into(), 500),
            (TokenError::MissingSecret.into(), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err:?}");
        }
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = AccessError::from(StoreError::Internal("disk I/O error at page 7".into()));
        assert!(!err.public_message().contains("disk"));
        assert_eq!(err.error_code(), "internal_error");
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(4200)), 5);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
    }

    #[test]
    fn basic_rejection_carries_challenge() {
        let response = AccessError::from(CredentialError::InvalidCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().starts_with("Basic realm="));
    }

    #[test]
    fn rate_limited_response_has_retry_after() {
        let response = AccessError::RateLimited {
            retry_after: Duration::from_millis(2500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "3");
    }
}
