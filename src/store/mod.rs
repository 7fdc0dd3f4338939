//! Storage collaborator contract.
//!
//! The access-control core reads and writes identities, invitations and
//! roles only through [`AccessStore`]. Two implementations exist:
//! - [`crate::db::Database`]: SQLite via SQLx
//! - [`memory::MemoryStore`]: in-process fake for tests and local runs
//!
//! Route-level resource resolution (posts) goes through [`PostStore`].

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Storage contract errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("email already exists")]
    DuplicateEmail,
    #[error("username already exists")]
    DuplicateUsername,
    #[error("storage failure: {0}")]
    Internal(String),
}

/// Named authorization tier. Higher `level` dominates lower levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub description: Option<String>,
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: i64,
    pub is_active: bool,
    pub role: Role,
}

/// Identity row to insert. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// Role assigned at registration.
    pub role_name: String,
}

/// An identity joined to the invitation that can activate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvitation {
    pub invitation_id: i64,
    pub identity: Identity,
}

/// A post, the resource addressed by ownership-gated routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Durable state consumed by the access-control core.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Insert an inactive identity and its invitation in one transaction.
    ///
    /// Returns the created identity, read back before commit. Uniqueness
    /// violations surface as `DuplicateEmail` / `DuplicateUsername`; nothing
    /// persists on any error.
    async fn create_identity_and_invitation(
        &self,
        identity: &NewIdentity,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Identity, StoreError>;

    async fn find_identity_by_id(&self, id: i64) -> Result<Identity, StoreError>;

    /// Identity plus its stored password hash, looked up by email.
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<(Identity, String), StoreError>;

    /// Invitation with this hash whose expiry is strictly after `now`.
    async fn find_unconsumed_invitation(
        &self,
        token_hash: &str,
        now: i64,
    ) -> Result<PendingInvitation, StoreError>;

    /// Set the identity active and delete the invitation in one transaction.
    ///
    /// Fails with `NotFound` (and rolls back) if the invitation was already
    /// consumed by a concurrent redemption.
    async fn activate_and_consume(
        &self,
        identity_id: i64,
        invitation_id: i64,
    ) -> Result<(), StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

/// Post lookup and mutation for resource-scoped routes.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_post(&self, id: i64) -> Result<Post, StoreError>;

    async fn update_post(&self, id: i64, title: &str, content: &str) -> Result<Post, StoreError>;

    async fn delete_post(&self, id: i64) -> Result<(), StoreError>;
}
