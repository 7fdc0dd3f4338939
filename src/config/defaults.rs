//! Default value functions for configuration.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_listen() -> std::net::SocketAddr {
    std::net::SocketAddr::from(([0, 0, 0, 0], 8080))
}

pub fn default_environment() -> String {
    "development".to_string()
}

pub fn default_api_url() -> String {
    "localhost:8080".to_string()
}

pub fn default_database_path() -> String {
    "socialgate.db".to_string()
}

// =============================================================================
// Auth Defaults
// =============================================================================

pub fn default_issuer() -> String {
    "socialgate".to_string()
}

pub fn default_audience() -> String {
    "socialgate".to_string()
}

/// Session tokens live for three days.
pub fn default_token_validity() -> u64 {
    3 * 24 * 3600
}

// =============================================================================
// Invitation / Mail Defaults
// =============================================================================

/// Invitations expire three days after registration.
pub fn default_invitation_validity() -> u64 {
    3 * 24 * 3600
}

pub fn default_from_email() -> String {
    "no-reply@socialgate.local".to_string()
}

pub fn default_activation_url() -> String {
    "http://localhost:5173/confirm".to_string()
}

// =============================================================================
// Rate Limiter Defaults
// =============================================================================

pub fn default_requests_per_frame() -> u32 {
    20
}

pub fn default_frame_secs() -> u64 {
    5
}

pub fn default_max_tracked_clients() -> usize {
    10_000
}

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}
