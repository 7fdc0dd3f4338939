//! Prometheus metrics collection for socialgate.
//!
//! Exposed on a separate HTTP listener when `server.metrics_port` is set.
//!
//! - `socialgate_admission_rejected_total` - requests refused by the limiter
//! - `socialgate_auth_failures_total{scheme, reason}` - 401 outcomes
//! - `socialgate_authz_denied_total{role}` - 403 outcomes by required role
//! - `socialgate_invitations_issued_total` / `socialgate_activations_total`
//! - `socialgate_request_errors_total{code}` - error responses by error code

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Requests rejected by the admission limiter.
pub static ADMISSION_REJECTED: OnceLock<IntCounter> = OnceLock::new();

/// Authentication failures by scheme and reason.
pub static AUTH_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Authorization denials by required role.
pub static AUTHZ_DENIED: OnceLock<IntCounterVec> = OnceLock::new();

/// Invitations created at registration.
pub static INVITATIONS_ISSUED: OnceLock<IntCounter> = OnceLock::new();

/// Accounts activated by invitation redemption.
pub static ACTIVATIONS: OnceLock<IntCounter> = OnceLock::new();

/// Error responses by error code.
pub static REQUEST_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(ADMISSION_REJECTED, IntCounter::new("socialgate_admission_rejected_total", "Requests rejected by the admission limiter"));
    register!(AUTH_FAILURES, IntCounterVec::new(Opts::new("socialgate_auth_failures_total", "Authentication failures"), &["scheme", "reason"]));
    register!(AUTHZ_DENIED, IntCounterVec::new(Opts::new("socialgate_authz_denied_total", "Authorization denials by required role"), &["role"]));
    register!(INVITATIONS_ISSUED, IntCounter::new("socialgate_invitations_issued_total", "Invitations issued at registration"));
    register!(ACTIVATIONS, IntCounter::new("socialgate_activations_total", "Accounts activated"));
    register!(REQUEST_ERRORS, IntCounterVec::new(Opts::new("socialgate_request_errors_total", "Error responses by error code"), &["code"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates (no-ops until `init` runs)
// ============================================================================

#[inline]
pub fn record_admission_rejected() {
    if let Some(c) = ADMISSION_REJECTED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_auth_failure(scheme: &str, reason: &str) {
    if let Some(c) = AUTH_FAILURES.get() {
        c.with_label_values(&[scheme, reason]).inc();
    }
}

#[inline]
pub fn record_authz_denied(role: &str) {
    if let Some(c) = AUTHZ_DENIED.get() {
        c.with_label_values(&[role]).inc();
    }
}

#[inline]
pub fn record_invitation_issued() {
    if let Some(c) = INVITATIONS_ISSUED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_activation() {
    if let Some(c) = ACTIVATIONS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_request_error(code: &str) {
    if let Some(c) = REQUEST_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_auth_failure("bearer", "expired");
        record_admission_rejected();

        let output = gather_metrics();
        assert!(output.contains("socialgate_auth_failures_total"));
        assert!(output.contains("socialgate_admission_rejected_total"));
    }
}
