//! Authorization engine: resource ownership combined with role precedence.
//!
//! Roles form a total order by level. An identity may act on a resource it
//! owns, or on anyone's resource when its role level is at least the level
//! of the required role.

use crate::store::{AccessStore, Identity, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Authorization failures. A denial is not an error; it is `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("role lookup failed: {0}")]
    Internal(String),
}

/// Pure ownership/role decision over the role table.
#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn AccessStore>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Decide whether `identity` may act on a resource owned by `owner_id`.
    ///
    /// Ownership short-circuits before the role is resolved, so an unknown
    /// `required_role` only fails for non-owners.
    pub async fn is_authorized(
        &self,
        identity: &Identity,
        owner_id: i64,
        required_role: &str,
    ) -> Result<bool, AuthzError> {
        if identity.id == owner_id {
            return Ok(true);
        }

        let required = self
            .store
            .find_role_by_name(required_role)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthzError::UnknownRole(required_role.to_string()),
                other => AuthzError::Internal(other.to_string()),
            })?;

        let allowed = identity.role.level >= required.level;
        if !allowed {
            tracing::debug!(
                user_id = identity.id,
                role = %identity.role.name,
                required = %required.name,
                "role precedence too low"
            );
        }
        Ok(allowed)
    }
}
