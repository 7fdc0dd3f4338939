//! Security module for socialgate.
//!
//! Provides the authentication primitives of the access-control core:
//! - **Session Tokens**: HS256 JWTs carrying the identity id
//! - **Credential Gate**: HTTP Basic check against the operator credential
//! - **Rate Limiting**: per-client admission control (fixed window / token bucket)
//! - **Passwords**: Argon2 hashing for identity credentials
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Security Module                        │
//! ├───────────────┬────────────────┬───────────────┬────────────┤
//! │ TokenService  │ CredentialGate │ RateLimitMgr  │  password  │
//! │ jsonwebtoken  │ base64+subtle  │ DashMap/gov.  │  Argon2    │
//! │ HS256, sub    │ bcrypt option  │ fixed window  │  salted    │
//! └───────────────┴────────────────┴───────────────┴────────────┘
//! ```

pub mod basic;
pub mod password;
pub mod rate_limit;
pub mod token;

// Re-export primary types for convenience
pub use basic::{CredentialError, CredentialGate};
pub use rate_limit::{
    Admission, AdmissionLimiter, FixedWindowLimiter, RateLimitManager, TokenBucketLimiter,
};
pub use token::{TokenError, TokenService};
