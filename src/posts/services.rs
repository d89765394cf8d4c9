use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::auth::repo_types::{Role, SessionUser};
use crate::error::ApiError;
use crate::posts::repo::PostStore;
use crate::posts::repo_types::{NewPost, Post, PostChanges};

/// Post CRUD over the store, with author-or-admin checks on mutation.
#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn PostStore>,
}

impl PostService {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    fn can_mutate(post: &Post, actor: &SessionUser) -> bool {
        post.user_id == actor.id || actor.role == Role::Admin
    }

    pub async fn list(&self) -> Result<Vec<Post>, ApiError> {
        self.store.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Post, ApiError> {
        self.store.find_by_id(id).await?.ok_or(ApiError::NotFound)
    }

    pub async fn create(&self, actor: &SessionUser, post: NewPost) -> Result<Post, ApiError> {
        let post = self.store.create(actor.id, post).await?;
        info!(post_id = %post.id, user_id = %actor.id, "post created");
        Ok(post)
    }

    pub async fn update(
        &self,
        actor: &SessionUser,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Post, ApiError> {
        let existing = self.store.find_by_id(id).await?.ok_or(ApiError::NotFound)?;
        if !Self::can_mutate(&existing, actor) {
            return Err(ApiError::Forbidden);
        }
        self.store.update(id, changes).await?.ok_or(ApiError::NotFound)
    }

    pub async fn delete(&self, actor: &SessionUser, id: Uuid) -> Result<(), ApiError> {
        let existing = self.store.find_by_id(id).await?.ok_or(ApiError::NotFound)?;
        if !Self::can_mutate(&existing, actor) {
            return Err(ApiError::Forbidden);
        }
        if !self.store.delete(id).await? {
            return Err(ApiError::NotFound);
        }
        info!(post_id = %id, user_id = %actor.id, "post deleted");
        Ok(())
    }
}
