//! User repository: identities and their invitations.
//!
//! Registration and activation each run in a single transaction. A
//! transaction dropped without `commit` rolls back, so every early return
//! below leaves no partial state.

use super::DbError;
use crate::store::{Identity, NewIdentity, PendingInvitation, Role};
use sqlx::SqlitePool;

type IdentityRow = (i64, String, String, i64, bool, i64, String, i64, Option<String>);

const IDENTITY_COLUMNS: &str = r#"
    u.id, u.username, u.email, u.created_at, u.is_active,
    r.id, r.name, r.level, r.description
"#;

fn identity_from_row(row: IdentityRow) -> Identity {
    let (id, username, email, created_at, is_active, role_id, role_name, level, description) = row;
    Identity {
        id,
        username,
        email,
        created_at,
        is_active,
        role: Role {
            id: role_id,
            name: role_name,
            level,
            description,
        },
    }
}

/// Map a UNIQUE violation on `users` to the field that caused it.
fn classify_insert_error(e: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let message = db_err.message();
        if message.contains("users.email") {
            return DbError::DuplicateEmail;
        }
        if message.contains("users.username") {
            return DbError::DuplicateUsername;
        }
    }
    DbError::from(e)
}

/// Repository for identity and invitation operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an inactive identity and its invitation atomically.
    pub async fn create_with_invitation(
        &self,
        identity: &NewIdentity,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Identity, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // UNIQUE constraints decide duplicates; no pre-check.
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, created_at, is_active, role_id)
            VALUES (?, ?, ?, ?, 0, (SELECT id FROM roles WHERE name = ?))
            "#,
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(now)
        .bind(&identity.role_name)
        .execute(&mut *tx)
        .await
        .map_err(classify_insert_error)?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO user_invitations (token_hash, user_id, expiry)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        // Read back inside the transaction so a failed read rolls back too.
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            SELECT {IDENTITY_COLUMNS}
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.id = ?
            "#
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::Integrity(format!("role {} not found", identity.role_name)))?;

        tx.commit().await?;

        Ok(identity_from_row(row))
    }

    /// Find identity by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, DbError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            SELECT {IDENTITY_COLUMNS}
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.id = ?
            "#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(identity_from_row))
    }

    /// Find identity and password hash by email (case-insensitive).
    pub async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(Identity, String)>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, i64, bool, i64, String, i64, Option<String>, String)>(
            &format!(
                r#"
                SELECT {IDENTITY_COLUMNS}, u.password_hash
                FROM users u
                JOIN roles r ON r.id = u.role_id
                WHERE u.email = ? COLLATE NOCASE
                "#
            ),
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(id, username, email, created_at, is_active, role_id, role_name, level, description, hash)| {
                let identity = identity_from_row((
                    id, username, email, created_at, is_active, role_id, role_name, level, description,
                ));
                (identity, hash)
            },
        ))
    }

    /// Find the invitation with this hash whose expiry is after `now`.
    pub async fn find_invitation(
        &self,
        token_hash: &str,
        now: i64,
    ) -> Result<Option<PendingInvitation>, DbError> {
        let row = sqlx::query_as::<_, (i64, i64, String, String, i64, bool, i64, String, i64, Option<String>)>(
            &format!(
                r#"
                SELECT i.id, {IDENTITY_COLUMNS}
                FROM user_invitations i
                JOIN users u ON u.id = i.user_id
                JOIN roles r ON r.id = u.role_id
                WHERE i.token_hash = ? AND i.expiry > ?
                "#
            ),
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(invitation_id, id, username, email, created_at, is_active, role_id, role_name, level, description)| {
                PendingInvitation {
                    invitation_id,
                    identity: identity_from_row((
                        id, username, email, created_at, is_active, role_id, role_name, level,
                        description,
                    )),
                }
            },
        ))
    }

    /// Flip the identity active and delete its invitation atomically.
    ///
    /// Returns `NotFound` without committing if the invitation is already gone.
    pub async fn activate(&self, user_id: i64, invitation_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET is_active = 1 WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM user_invitations WHERE id = ? AND user_id = ?")
            .bind(invitation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
