//! Role repository.

use super::DbError;
use crate::store::Role;
use sqlx::SqlitePool;

/// Repository for role lookups. Roles are seeded by migration.
pub struct RoleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, i64, Option<String>)>(
            "SELECT id, name, level, description FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, name, level, description)| Role {
            id,
            name,
            level,
            description,
        }))
    }
}
