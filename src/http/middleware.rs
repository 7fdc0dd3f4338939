//! Ingress pipeline.
//!
//! Order per request, short-circuiting on the first failure:
//! admission limit, scheme authentication (Basic or Bearer plus identity
//! lookup), post resolution, ownership/role authorization, handler.

use super::AppState;
use super::scope::RequestScope;
use crate::authz::Authorizer;
use crate::error::{AccessError, AuthScheme};
use crate::metrics;
use crate::security::CredentialError;
use crate::store::StoreError;
use crate::telemetry::{RequestTimer, new_request_id, spans};
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::{Instrument, debug, warn};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Span and request id for every request.
pub async fn trace_request(req: Request, next: Next) -> Response {
    let request_id = new_request_id();
    let span = spans::request(req.method().as_str(), req.uri().path(), &request_id);
    let _timer = RequestTimer::new(req.uri().path().to_string());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Client key for admission: the peer IP address.
pub fn client_key(connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject clients over their admission limit.
///
/// The peer address goes through the `ConnectInfo` extractor so that
/// `MockConnectInfo` is honoured in tests.
pub async fn admission(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let client = client_key(connect_info.as_ref());
    let admission = state.limiter.allow(&client);
    if !admission.allowed {
        metrics::record_admission_rejected();
        warn!(client = %client, "request rejected by admission limiter");
        return Err(AccessError::RateLimited {
            retry_after: admission.retry_after,
        });
    }
    Ok(next.run(req).await)
}

fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, CredentialError> {
    headers
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| CredentialError::MalformedHeader))
        .transpose()
}

fn auth_failure(scheme: AuthScheme, err: AccessError) -> AccessError {
    if let AccessError::Unauthorized { reason, .. } = &err {
        metrics::record_auth_failure(scheme.as_str(), reason);
        debug!(scheme = scheme.as_str(), reason = *reason, "authentication failed");
    }
    err
}

/// HTTP Basic against the operator credential.
pub async fn basic_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AccessError> {
    authorization_header(req.headers())
        .and_then(|value| state.gate.verify(value))
        .map_err(|e| auth_failure(AuthScheme::Basic, e.into()))?;

    Ok(next.run(req).await)
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AccessError> {
    let unauthorized = |reason| AccessError::Unauthorized {
        scheme: AuthScheme::Bearer,
        reason,
    };

    let value = authorization_header(headers)
        .map_err(|_| unauthorized("malformed_header"))?
        .ok_or_else(|| unauthorized("missing_header"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(unauthorized("malformed_header")),
    }
}

/// Verify the session token and resolve its subject to an active identity.
pub async fn bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let subject = bearer_token(req.headers())
        .and_then(|token| state.tokens.verify(token).map_err(AccessError::from))
        .map_err(|e| auth_failure(AuthScheme::Bearer, e))?;

    // A valid signature says nothing about whether the subject still exists.
    let identity = match state.store.find_identity_by_id(subject).await {
        Ok(identity) if identity.is_active => identity,
        Ok(_) | Err(StoreError::NotFound) => {
            metrics::record_auth_failure(AuthScheme::Bearer.as_str(), "unknown_identity");
            debug!(user_id = subject, "token subject missing or inactive");
            return Err(AccessError::UnknownIdentity);
        }
        Err(e) => return Err(e.into()),
    };

    req.extensions_mut().insert(RequestScope::new(identity));
    Ok(next.run(req).await)
}

/// Parse a numeric path identifier.
pub fn parse_id(raw: &str) -> Result<i64, AccessError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AccessError::InvalidInput(format!("invalid id: {raw}")))
}

/// Resolve `:post_id` into the request scope.
pub async fn post_context(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    scope: RequestScope,
    mut req: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let post = state.posts.find_post(parse_id(&post_id)?).await?;
    req.extensions_mut().insert(scope.with_post(post));
    Ok(next.run(req).await)
}

/// Role required of non-owners for a route.
#[derive(Clone)]
pub struct RoleGate {
    pub authz: Authorizer,
    pub role: &'static str,
}

/// Allow owners of the scoped post, or identities at least at `role`.
pub async fn require_post_ownership(
    State(gate): State<RoleGate>,
    scope: RequestScope,
    req: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let post = scope.post()?;
    if !gate
        .authz
        .is_authorized(&scope.identity, post.user_id, gate.role)
        .await?
    {
        metrics::record_authz_denied(gate.role);
        warn!(
            user_id = scope.identity.id,
            post_id = post.id,
            required = gate.role,
            "authorization denied"
        );
        return Err(AccessError::Forbidden);
    }
    Ok(next.run(req).await)
}
