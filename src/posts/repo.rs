use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::posts::repo_types::{NewPost, Post, PostChanges};

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Post>, ApiError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>, ApiError>;
    async fn create(&self, author_id: Uuid, post: NewPost) -> Result<Post, ApiError>;
    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>, ApiError>;
    async fn delete(&self, id: Uuid) -> Result<bool, ApiError>;
}

#[derive(Clone)]
pub struct PgPostStore {
    pub db: PgPool,
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn list(&self) -> Result<Vec<Post>, ApiError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, title, content, cover_image, is_draft, created_at, updated_at
            FROM posts
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list posts")?;
        Ok(posts)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>, ApiError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, title, content, cover_image, is_draft, created_at, updated_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find post by id")?;
        Ok(post)
    }

    async fn create(&self, author_id: Uuid, post: NewPost) -> Result<Post, ApiError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, user_id, title, content, cover_image, is_draft)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, title, content, cover_image, is_draft, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.cover_image)
        .bind(post.is_draft)
        .fetch_one(&self.db)
        .await
        .context("insert post")?;
        Ok(post)
    }

    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>, ApiError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                cover_image = COALESCE($4, cover_image),
                is_draft = COALESCE($5, is_draft),
                updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, title, content, cover_image, is_draft, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .bind(changes.cover_image)
        .bind(changes.is_draft)
        .fetch_optional(&self.db)
        .await
        .context("update post")?;
        Ok(post)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete post")?;
        Ok(result.rows_affected() > 0)
    }
}
