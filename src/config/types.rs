//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::{
    default_activation_url, default_api_url, default_database_path, default_environment,
    default_from_email, default_invitation_validity, default_listen, default_true,
};
use super::security::{AuthConfig, RateLimiterConfig};

/// Environment variable overriding `[auth.token].secret`.
pub const TOKEN_SECRET_ENV: &str = "SOCIALGATE_TOKEN_SECRET";

/// Environment variable overriding `[auth.basic].password`.
pub const BASIC_PASSWORD_ENV: &str = "SOCIALGATE_BASIC_PASSWORD";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener and process settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Operator credentials and session token signing.
    pub auth: AuthConfig,
    /// Invitation lifetime.
    #[serde(default)]
    pub invitations: InvitationConfig,
    /// Activation email settings.
    #[serde(default)]
    pub mail: MailConfig,
    /// Admission limiter settings.
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Replace secrets with values from the environment when present.
    ///
    /// The lookup is injected so callers (and tests) control the source.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(TOKEN_SECRET_ENV).filter(|s| !s.is_empty()) {
            tracing::debug!("token secret taken from {}", TOKEN_SECRET_ENV);
            self.auth.token.secret = secret;
        }
        if let Some(password) = lookup(BASIC_PASSWORD_ENV).filter(|s| !s.is_empty()) {
            tracing::debug!("operator password taken from {}", BASIC_PASSWORD_ENV);
            self.auth.basic.password = password;
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Listener and process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the API listens on (default: 0.0.0.0:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Deployment environment name, reported by the health endpoint.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Externally visible API address.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Prometheus metrics HTTP port. `0` disables the endpoint.
    pub metrics_port: Option<u16>,
    /// Log output format (text or json).
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            environment: default_environment(),
            api_url: default_api_url(),
            metrics_port: None,
            log_format: LogFormat::default(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Invitation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InvitationConfig {
    /// Seconds an activation token stays redeemable (default: 3 days).
    #[serde(default = "default_invitation_validity")]
    pub validity_secs: u64,
}

impl InvitationConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            validity_secs: default_invitation_validity(),
        }
    }
}

/// Activation email configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender address.
    #[serde(default = "default_from_email")]
    pub from_email: String,
    /// Base URL of the activation page; the plaintext token is appended.
    #[serde(default = "default_activation_url")]
    pub activation_url: String,
    /// Log rendered messages instead of handing them to a transport.
    #[serde(default = "default_true")]
    pub sandbox: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_email: default_from_email(),
            activation_url: default_activation_url(),
            sandbox: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn minimal_config() -> &'static str {
        r#"
[auth.basic]
username = "admin"
password = "operator-secret"

[auth.token]
secret = "0123456789abcdef0123456789abcdef"
"#
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_toml(minimal_config()).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.environment, "development");
        assert_eq!(config.database.path, "socialgate.db");
        assert_eq!(config.invitations.validity(), Duration::from_secs(3 * 24 * 3600));
        assert!(config.rate_limiter.enabled);
        assert_eq!(config.rate_limiter.requests_per_frame, 20);
        assert_eq!(config.rate_limiter.frame_secs, 5);
        assert!(config.mail.sandbox);
        assert_eq!(config.server.log_format, LogFormat::Text);
    }

    #[test]
    fn missing_auth_section_fails_to_parse() {
        let err = Config::from_toml("[server]\nenvironment = \"prod\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_replace_secrets() {
        let mut config = Config::from_toml(minimal_config()).unwrap();
        let env: HashMap<&str, &str> = [
            (TOKEN_SECRET_ENV, "from-environment-from-environment!"),
            (BASIC_PASSWORD_ENV, "env-password"),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.auth.token.secret, "from-environment-from-environment!");
        assert_eq!(config.auth.basic.password, "env-password");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = Config::from_toml(minimal_config()).unwrap();
        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config.auth.basic.password, "operator-secret");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal_config().as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.auth.basic.username, "admin");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/socialgate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
