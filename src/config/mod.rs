//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and loading (Config, ServerConfig, DatabaseConfig)
//! - [`security`]: Authentication and admission settings (AuthConfig, RateLimiterConfig)
//! - [`defaults`]: Serde default value functions
//! - [`validation`]: Startup validation of a loaded configuration

mod defaults;
mod security;
mod types;
pub mod validation;

pub use security::{
    AuthConfig, BasicAuthConfig, LimiterAlgorithm, RateLimiterConfig, TokenConfig,
};
pub use types::{
    Config, ConfigError, DatabaseConfig, InvitationConfig, LogFormat, MailConfig, ServerConfig,
};
