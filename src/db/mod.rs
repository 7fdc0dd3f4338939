//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - Identities and their roles
//! - Invitation tokens (hashed) for account activation
//! - Posts addressed by ownership-gated routes
//!
//! [`Database`] implements the [`AccessStore`] and [`PostStore`] contracts.

mod posts;
mod roles;
mod users;

pub use posts::PostRepository;
pub use roles::RoleRepository;
pub use users::UserRepository;

use crate::store::{AccessStore, Identity, NewIdentity, PendingInvitation, Post, PostStore, Role, StoreError};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("record not found")]
    NotFound,
    #[error("email already exists")]
    DuplicateEmail,
    #[error("username already exists")]
    DuplicateUsername,
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound,
            DbError::DuplicateEmail => StoreError::DuplicateEmail,
            DbError::DuplicateUsername => StoreError::DuplicateUsername,
            other => StoreError::Internal(other.to_string()),
        }
    }
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache memory database per call;
            // `file::memory:` would collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:socialgate-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .foreign_keys(true)
                .create_if_missing(true);

            // The memory database lives only while a connection is open.
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .max_lifetime(None)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            // The parent directory must already exist; startup validation
            // reports a missing one. Pragmas on the options apply to every
            // pooled connection.
            let options = SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Integrity(integrity_result));
        }

        info!("Database integrity check passed");

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get user repository.
    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    /// Get role repository.
    pub fn roles(&self) -> RoleRepository<'_> {
        RoleRepository::new(&self.pool)
    }

    /// Get post repository.
    pub fn posts(&self) -> PostRepository<'_> {
        PostRepository::new(&self.pool)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

#[async_trait]
impl AccessStore for Database {
    async fn create_identity_and_invitation(
        &self,
        identity: &NewIdentity,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Identity, StoreError> {
        Ok(self
            .users()
            .create_with_invitation(identity, token_hash, expires_at)
            .await?)
    }

    async fn find_identity_by_id(&self, id: i64) -> Result<Identity, StoreError> {
        self.users().find_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<(Identity, String), StoreError> {
        self.users()
            .find_credentials_by_email(email)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn find_unconsumed_invitation(
        &self,
        token_hash: &str,
        now: i64,
    ) -> Result<PendingInvitation, StoreError> {
        self.users()
            .find_invitation(token_hash, now)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn activate_and_consume(
        &self,
        identity_id: i64,
        invitation_id: i64,
    ) -> Result<(), StoreError> {
        Ok(self.users().activate(identity_id, invitation_id).await?)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Role, StoreError> {
        self.roles().find_by_name(name).await?.ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl PostStore for Database {
    async fn find_post(&self, id: i64) -> Result<Post, StoreError> {
        self.posts().find_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> Result<Post, StoreError> {
        Ok(self.posts().update(id, title, content).await?)
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        Ok(self.posts().delete(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_identity(username: &str, email: &str) -> NewIdentity {
        NewIdentity {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            role_name: "user".to_string(),
        }
    }

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_seed_roles() {
        let db = Database::new(":memory:").await.unwrap();
        let admin = db.find_role_by_name("admin").await.unwrap();
        assert_eq!(admin.level, 3);
        assert_eq!(db.find_role_by_name("moderator").await.unwrap().level, 2);
        assert_eq!(db.find_role_by_name("nope").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn file_database_requires_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("socialgate.db");
        assert!(Database::new(path.to_str().unwrap()).await.is_err());
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_redemptions_activate_once() {
        use crate::invitation::{InvitationError, InvitationService, RegistrationDraft};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socialgate.db");
        let db = Arc::new(Database::new(path.to_str().unwrap()).await.unwrap());
        let service = InvitationService::new(db.clone());

        let draft = RegistrationDraft::new("alice", "alice@example.com", "hunter22");
        let issued = service
            .register_and_invite(&draft, Duration::from_secs(60))
            .await
            .unwrap();

        let (a, b) = tokio::join!(service.activate(&issued.token), service.activate(&issued.token));
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(r, Err(InvitationError::NotFound))));

        assert!(db.find_identity_by_id(issued.identity.id).await.unwrap().is_active);
        assert_eq!(count(&db, "user_invitations").await, 0);
    }

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = Database::new(":memory:").await.unwrap();
        let b = Database::new(":memory:").await.unwrap();
        a.create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "h1", i64::MAX)
            .await
            .unwrap();
        assert_eq!(count(&a, "users").await, 1);
        assert_eq!(count(&b, "users").await, 0);
    }

    #[tokio::test]
    async fn registration_then_activation() {
        let db = Database::new(":memory:").await.unwrap();
        let now = chrono::Utc::now().timestamp();
        let created = db
            .create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "hash-a", now + 60)
            .await
            .unwrap();
        let id = created.id;

        let identity = db.find_identity_by_id(id).await.unwrap();
        assert_eq!(identity, created);
        assert!(!identity.is_active);
        assert_eq!(identity.role.name, "user");

        let pending = db.find_unconsumed_invitation("hash-a", now).await.unwrap();
        assert_eq!(pending.identity.id, id);

        db.activate_and_consume(id, pending.invitation_id).await.unwrap();
        assert!(db.find_identity_by_id(id).await.unwrap().is_active);
        assert_eq!(count(&db, "user_invitations").await, 0);

        assert_eq!(
            db.activate_and_consume(id, pending.invitation_id).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(
            db.find_unconsumed_invitation("hash-a", now).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn expiry_is_strict() {
        let db = Database::new(":memory:").await.unwrap();
        let id = db
            .create_identity_and_invitation(&new_identity("bob", "bob@example.com"), "hash-b", 1_000)
            .await
            .unwrap()
            .id;
        assert_eq!(
            db.find_unconsumed_invitation("hash-b", 1_000).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(db.find_unconsumed_invitation("hash-b", 999).await.unwrap().identity.id, id);
    }

    #[tokio::test]
    async fn duplicates_are_classified() {
        let db = Database::new(":memory:").await.unwrap();
        db.create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "h1", i64::MAX)
            .await
            .unwrap();

        assert_eq!(
            db.create_identity_and_invitation(&new_identity("other", "ALICE@example.com"), "h2", i64::MAX)
                .await,
            Err(StoreError::DuplicateEmail)
        );
        assert_eq!(
            db.create_identity_and_invitation(&new_identity("alice", "new@example.com"), "h3", i64::MAX)
                .await,
            Err(StoreError::DuplicateUsername)
        );
        assert_eq!(count(&db, "users").await, 1);
        assert_eq!(count(&db, "user_invitations").await, 1);
    }

    #[tokio::test]
    async fn failed_invitation_insert_rolls_back_identity() {
        let db = Database::new(":memory:").await.unwrap();
        sqlx::query("DROP TABLE user_invitations")
            .execute(db.pool())
            .await
            .unwrap();

        let err = db
            .create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "h1", i64::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
        assert_eq!(count(&db, "users").await, 0);
    }

    #[tokio::test]
    async fn credentials_lookup_ignores_email_case() {
        let db = Database::new(":memory:").await.unwrap();
        let id = db
            .create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "h1", i64::MAX)
            .await
            .unwrap()
            .id;
        let (identity, hash) = db.find_credentials_by_email("Alice@Example.com").await.unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(hash, "$argon2id$placeholder");
    }

    #[tokio::test]
    async fn post_lifecycle() {
        let db = Database::new(":memory:").await.unwrap();
        let owner = db
            .create_identity_and_invitation(&new_identity("alice", "alice@example.com"), "h1", i64::MAX)
            .await
            .unwrap()
            .id;
        let post = db.posts().create(owner, "hello", "world").await.unwrap();

        assert_eq!(db.find_post(post.id).await.unwrap().user_id, owner);
        let updated = db.update_post(post.id, "hi", "there").await.unwrap();
        assert_eq!(updated.title, "hi");
        assert_eq!(updated.content, "there");

        db.delete_post(post.id).await.unwrap();
        assert_eq!(db.find_post(post.id).await, Err(StoreError::NotFound));
        assert_eq!(db.delete_post(post.id).await, Err(StoreError::NotFound));
        assert_eq!(db.update_post(post.id, "x", "y").await, Err(StoreError::NotFound));
    }
}
