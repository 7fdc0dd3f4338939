//! Authentication and admission-limiting configuration.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::{
    default_audience, default_frame_secs, default_issuer, default_max_tracked_clients,
    default_requests_per_frame, default_token_validity, default_true,
};

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Operator credential for Basic-protected routes.
    pub basic: BasicAuthConfig,
    /// Session token signing settings.
    pub token: TokenConfig,
}

/// Static operator credential.
#[derive(Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    /// Password (plaintext or bcrypt hash).
    pub password: String,
}

impl std::fmt::Debug for BasicAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session token signing configuration (HS256).
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret. MUST be at least 32 bytes.
    #[serde(default)]
    pub secret: String,
    /// `iss` claim written and required.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// `aud` claim written and required.
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Seconds from issuance until expiry (default: 3 days).
    #[serde(default = "default_token_validity")]
    pub validity_secs: u64,
}

impl TokenConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("validity_secs", &self.validity_secs)
            .finish()
    }
}

/// Admission limiter algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimiterAlgorithm {
    /// Counter reset at fixed frame boundaries.
    #[default]
    FixedWindow,
    /// GCRA token bucket (governor), burst = requests_per_frame.
    TokenBucket,
}

/// Admission limiter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimiterConfig {
    /// When false every request is admitted.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests admitted per client per frame (default: 20).
    #[serde(default = "default_requests_per_frame")]
    pub requests_per_frame: u32,
    /// Frame length in seconds (default: 5).
    #[serde(default = "default_frame_secs")]
    pub frame_secs: u64,
    /// Limiter algorithm (default: fixed-window).
    #[serde(default)]
    pub algorithm: LimiterAlgorithm,
    /// Client table size above which elapsed windows are pruned.
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
    /// Client keys exempt from admission limiting.
    #[serde(default)]
    pub exempt_clients: Vec<String>,
}

impl RateLimiterConfig {
    pub fn frame(&self) -> Duration {
        Duration::from_secs(self.frame_secs)
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_frame: default_requests_per_frame(),
            frame_secs: default_frame_secs(),
            algorithm: LimiterAlgorithm::default(),
            max_tracked_clients: default_max_tracked_clients(),
            exempt_clients: Vec::new(),
        }
    }
}
