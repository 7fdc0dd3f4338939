//! socialgate - access-control core for a social content API.
//!
//! Authenticates operators (HTTP Basic) and users (bearer session tokens),
//! runs the invitation-based account activation protocol, authorizes
//! actions by ownership and role precedence, and admits requests through a
//! per-client rate limiter.

pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod invitation;
pub mod mailer;
pub mod metrics;
pub mod security;
pub mod session;
pub mod store;
pub mod telemetry;
