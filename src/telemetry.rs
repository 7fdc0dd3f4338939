//! Telemetry utilities for request correlation.

use std::time::Instant;

/// Guard that logs request latency when dropped.
pub struct RequestTimer {
    route: String,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(route = %self.route, elapsed_ms, "request finished");
    }
}

/// Fresh request id for the `x-request-id` header.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for one inbound HTTP request.
    pub fn request(method: &str, path: &str, request_id: &str) -> Span {
        info_span!("request", method = %method, path = %path, request_id = %request_id)
    }

    /// Create a span for an invitation lifecycle operation.
    pub fn invitation(operation: &'static str) -> Span {
        info_span!("invitation", operation)
    }
}
