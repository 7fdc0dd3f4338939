//! Typed request scope threaded through the middleware pipeline.
//!
//! Bearer authentication inserts a [`RequestScope`] holding the resolved
//! identity; post resolution adds the addressed post. Handlers and later
//! middleware extract it by type.

use crate::error::AccessError;
use crate::store::{Identity, Post};
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

#[derive(Debug, Clone)]
pub struct RequestScope {
    pub identity: Identity,
    pub post: Option<Post>,
}

impl RequestScope {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            post: None,
        }
    }

    pub fn with_post(mut self, post: Post) -> Self {
        self.post = Some(post);
        self
    }

    /// The resolved post. Missing means the route was wired without
    /// post resolution.
    pub fn post(&self) -> Result<&Post, AccessError> {
        self.post
            .as_ref()
            .ok_or_else(|| AccessError::Internal("post not resolved for this route".into()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestScope {
    type Rejection = AccessError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestScope>()
            .cloned()
            .ok_or_else(|| AccessError::Internal("request scope missing".into()))
    }
}
