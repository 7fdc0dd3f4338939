//! Post repository.

use super::DbError;
use crate::store::Post;
use sqlx::SqlitePool;

type PostRow = (i64, i64, String, String, i64, i64);

fn post_from_row((id, user_id, title, content, created_at, updated_at): PostRow) -> Post {
    Post {
        id,
        user_id,
        title,
        content,
        created_at,
        updated_at,
    }
}

/// Repository for post operations.
pub struct PostRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PostRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, title: &str, content: &str) -> Result<Post, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO posts (title, content, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Post>, DbError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, user_id, title, content, created_at, updated_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(post_from_row))
    }

    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<Post, DbError> {
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts SET title = ?, content = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, user_id, title, content, created_at, updated_at
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(now)
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(post_from_row).ok_or(DbError::NotFound)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
