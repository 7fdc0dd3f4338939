//! HTTP Basic credential gate for operator routes.
//!
//! Compares the decoded `username:password` against the configured operator
//! credential without data-dependent early exits: both fields are reduced to
//! SHA-256 digests and compared with `subtle`, and both comparisons always
//! run. A configured password beginning with `$2` is treated as a bcrypt
//! hash instead.
//!
//! The gate keeps no lockout state; repeated failures are throttled by the
//! admission limiter in front of it.

use crate::config::BasicAuthConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;
use zeroize::Zeroizing;

/// Realm advertised in the `WWW-Authenticate` challenge.
pub const BASIC_REALM: &str = "restricted";

/// Credential gate failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("authorization header is missing")]
    MissingHeader,
    #[error("authorization header is malformed")]
    MalformedHeader,
    #[error("invalid credentials")]
    InvalidCredentials,
}

enum StoredPassword {
    Plain([u8; 32]),
    Bcrypt(String),
}

/// Verifies `Authorization: Basic ...` headers against one operator credential.
pub struct CredentialGate {
    username: [u8; 32],
    password: StoredPassword,
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate").finish_non_exhaustive()
    }
}

fn digest(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

impl CredentialGate {
    pub fn new(config: &BasicAuthConfig) -> Self {
        let password = if config.password.starts_with("$2") {
            StoredPassword::Bcrypt(config.password.clone())
        } else {
            StoredPassword::Plain(digest(config.password.as_bytes()))
        };
        Self {
            username: digest(config.username.as_bytes()),
            password,
        }
    }

    /// Verify a raw `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> Result<(), CredentialError> {
        let header = header.ok_or(CredentialError::MissingHeader)?;

        let mut parts = header.split(' ');
        let (Some(scheme), Some(payload), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CredentialError::MalformedHeader);
        };
        if scheme != "Basic" {
            return Err(CredentialError::MalformedHeader);
        }

        let decoded = Zeroizing::new(
            STANDARD
                .decode(payload)
                .map_err(|_| CredentialError::MalformedHeader)?,
        );
        let decoded =
            std::str::from_utf8(&decoded).map_err(|_| CredentialError::MalformedHeader)?;
        let Some((username, password)) = decoded.split_once(':') else {
            return Err(CredentialError::InvalidCredentials);
        };

        let user_ok = digest(username.as_bytes())[..].ct_eq(&self.username[..]);
        let pass_ok = match &self.password {
            StoredPassword::Plain(expected) => {
                digest(password.as_bytes())[..].ct_eq(&expected[..])
            }
            StoredPassword::Bcrypt(hash) => {
                Choice::from(u8::from(bcrypt::verify(password, hash).unwrap_or(false)))
            }
        };

        if bool::from(user_ok & pass_ok) {
            Ok(())
        } else {
            Err(CredentialError::InvalidCredentials)
        }
    }
}

/// `WWW-Authenticate` value for a failed Basic authentication.
pub fn challenge() -> String {
    format!("Basic realm=\"{BASIC_REALM}\", charset=\"UTF-8\"")
}
