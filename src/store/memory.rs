//! In-memory storage collaborator.
//!
//! Mirrors the SQLite schema's constraints (unique username/email, one
//! invitation per identity, strict expiry comparison) so the core can be
//! exercised without a database. All mutations happen under a single lock,
//! so each contract operation is atomic.

use super::{
    AccessStore, Identity, NewIdentity, PendingInvitation, Post, PostStore, Role, StoreError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    created_at: i64,
    is_active: bool,
    role_id: i64,
}

#[derive(Debug, Clone)]
struct InvitationRow {
    id: i64,
    token_hash: String,
    user_id: i64,
    expiry: i64,
}

#[derive(Debug, Default)]
struct Tables {
    roles: Vec<Role>,
    users: HashMap<i64, UserRow>,
    invitations: Vec<InvitationRow>,
    posts: HashMap<i64, Post>,
    next_user_id: i64,
    next_invitation_id: i64,
    next_post_id: i64,
}

impl Tables {
    fn identity(&self, row: &UserRow) -> Result<Identity, StoreError> {
        let role = self
            .roles
            .iter()
            .find(|r| r.id == row.role_id)
            .cloned()
            .ok_or_else(|| StoreError::Internal(format!("dangling role id {}", row.role_id)))?;
        Ok(Identity {
            id: row.id,
            username: row.username.clone(),
            email: row.email.clone(),
            created_at: row.created_at,
            is_active: row.is_active,
            role,
        })
    }
}

/// In-memory [`AccessStore`] and [`PostStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_invitation_writes: AtomicBool,
    fail_identity_lookups: AtomicBool,
}

impl MemoryStore {
    /// Empty store with no roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the same roles as the SQL migration.
    pub fn with_default_roles() -> Self {
        let store = Self::new();
        store.insert_role("user", 1, "A user can create posts and comments");
        store.insert_role("moderator", 2, "A moderator can update other users posts");
        store.insert_role("admin", 3, "An admin can update and delete other users posts");
        store
    }

    pub fn insert_role(&self, name: &str, level: i64, description: &str) -> Role {
        let mut tables = self.tables.lock();
        let role = Role {
            id: tables.roles.len() as i64 + 1,
            name: name.to_string(),
            level,
            description: Some(description.to_string()),
        };
        tables.roles.push(role.clone());
        role
    }

    /// Insert an identity directly, bypassing the invitation flow.
    pub fn insert_identity(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role_name: &str,
        is_active: bool,
    ) -> Result<Identity, StoreError> {
        let mut tables = self.tables.lock();
        let role_id = tables
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .map(|r| r.id)
            .ok_or(StoreError::NotFound)?;
        tables.next_user_id += 1;
        let row = UserRow {
            id: tables.next_user_id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: chrono::Utc::now().timestamp(),
            is_active,
            role_id,
        };
        let identity = tables.identity(&row)?;
        tables.users.insert(row.id, row);
        Ok(identity)
    }

    /// Delete an identity and its invitations.
    pub fn remove_identity(&self, id: i64) {
        let mut tables = self.tables.lock();
        tables.users.remove(&id);
        tables.invitations.retain(|inv| inv.user_id != id);
    }

    pub fn insert_post(&self, user_id: i64, title: &str, content: &str) -> Post {
        let mut tables = self.tables.lock();
        tables.next_post_id += 1;
        let now = chrono::Utc::now().timestamp();
        let post = Post {
            id: tables.next_post_id,
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        post
    }

    /// Make the invitation half of registration fail, after the identity
    /// half has been staged.
    pub fn fail_invitation_writes(&self, fail: bool) {
        self.fail_invitation_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `find_identity_by_id` fail with `Internal`.
    pub fn fail_identity_lookups(&self, fail: bool) {
        self.fail_identity_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn identity_count(&self) -> usize {
        self.tables.lock().users.len()
    }

    pub fn invitation_count(&self) -> usize {
        self.tables.lock().invitations.len()
    }

    /// Stored token hashes, for asserting that plaintext never persists.
    pub fn invitation_hashes(&self) -> Vec<String> {
        self.tables
            .lock()
            .invitations
            .iter()
            .map(|inv| inv.token_hash.clone())
            .collect()
    }

    pub fn password_hash_of(&self, id: i64) -> Option<String> {
        self.tables
            .lock()
            .users
            .get(&id)
            .map(|row| row.password_hash.clone())
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn create_identity_and_invitation(
        &self,
        identity: &NewIdentity,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Identity, StoreError> {
        let mut tables = self.tables.lock();

        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&identity.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        if tables.users.values().any(|u| u.username == identity.username) {
            return Err(StoreError::DuplicateUsername);
        }
        let role_id = tables
            .roles
            .iter()
            .find(|r| r.name == identity.role_name)
            .map(|r| r.id)
            .ok_or_else(|| StoreError::Internal(format!("unknown role {}", identity.role_name)))?;

        // Stage both rows; nothing is visible until both succeed.
        let user = UserRow {
            id: tables.next_user_id + 1,
            username: identity.username.clone(),
            email: identity.email.clone(),
            password_hash: identity.password_hash.clone(),
            created_at: chrono::Utc::now().timestamp(),
            is_active: false,
            role_id,
        };

        if self.fail_invitation_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("invitation write failed".into()));
        }
        if tables.invitations.iter().any(|inv| inv.token_hash == token_hash) {
            return Err(StoreError::Internal("duplicate invitation token".into()));
        }

        let invitation = InvitationRow {
            id: tables.next_invitation_id + 1,
            token_hash: token_hash.to_string(),
            user_id: user.id,
            expiry: expires_at,
        };

        let created = tables.identity(&user)?;
        tables.next_user_id = user.id;
        tables.next_invitation_id = invitation.id;
        tables.users.insert(user.id, user);
        tables.invitations.push(invitation);
        Ok(created)
    }

    async fn find_identity_by_id(&self, id: i64) -> Result<Identity, StoreError> {
        if self.fail_identity_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("identity lookup failed".into()));
        }
        let tables = self.tables.lock();
        let row = tables.users.get(&id).ok_or(StoreError::NotFound)?;
        tables.identity(row)
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<(Identity, String), StoreError> {
        let tables = self.tables.lock();
        let row = tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .ok_or(StoreError::NotFound)?;
        Ok((tables.identity(row)?, row.password_hash.clone()))
    }

    async fn find_unconsumed_invitation(
        &self,
        token_hash: &str,
        now: i64,
    ) -> Result<PendingInvitation, StoreError> {
        let tables = self.tables.lock();
        let invitation = tables
            .invitations
            .iter()
            .find(|inv| inv.token_hash == token_hash && inv.expiry > now)
            .ok_or(StoreError::NotFound)?;
        let row = tables
            .users
            .get(&invitation.user_id)
            .ok_or(StoreError::NotFound)?;
        Ok(PendingInvitation {
            invitation_id: invitation.id,
            identity: tables.identity(row)?,
        })
    }

    async fn activate_and_consume(
        &self,
        identity_id: i64,
        invitation_id: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let position = tables
            .invitations
            .iter()
            .position(|inv| inv.id == invitation_id && inv.user_id == identity_id)
            .ok_or(StoreError::NotFound)?;
        let user = tables
            .users
            .get_mut(&identity_id)
            .ok_or(StoreError::NotFound)?;
        user.is_active = true;
        tables.invitations.remove(position);
        Ok(())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Role, StoreError> {
        self.tables
            .lock()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn find_post(&self, id: i64) -> Result<Post, StoreError> {
        self.tables
            .lock()
            .posts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock();
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        post.title = title.to_string();
        post.content = content.to_string();
        post.updated_at = chrono::Utc::now().timestamp();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        self.tables
            .lock()
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
