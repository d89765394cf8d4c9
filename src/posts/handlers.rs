use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::auth::dto::MessageResponse;
use crate::auth::session::CurrentUser;
use crate::error::ApiError;
use crate::posts::dto::{CreatePostRequest, UpdatePostRequest};
use crate::posts::repo_types::{NewPost, Post, PostChanges};
use crate::state::AppState;

fn validate_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    if value.len() < min || value.len() > max {
        return Err(ApiError::Validation(format!(
            "{field} must be between {min} and {max} characters long"
        )));
    }
    Ok(())
}

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).put(update_post).delete(delete_post),
        )
}

pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, ApiError> {
    let posts = state.posts.list().await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    let post = state.posts.get(id).await?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Post>), ApiError> {
    validate_len("Post title", &payload.title, 2, 255)?;
    validate_len("Post content", &payload.content, 2, 20_000)?;
    validate_len("Cover image", &payload.cover_image, 2, 2_048)?;

    let post = state
        .posts
        .create(
            &user,
            NewPost {
                title: payload.title,
                content: payload.content,
                cover_image: payload.cover_image,
                is_draft: payload.is_draft.unwrap_or(true),
            },
        )
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/posts/{}", post.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    if let Some(title) = &payload.title {
        validate_len("Post title", title, 2, 255)?;
    }
    if let Some(content) = &payload.content {
        validate_len("Post content", content, 2, 20_000)?;
    }
    if let Some(cover_image) = &payload.cover_image {
        validate_len("Cover image", cover_image, 2, 2_048)?;
    }

    let post = state
        .posts
        .update(
            &user,
            id,
            PostChanges {
                title: payload.title,
                content: payload.content,
                cover_image: payload.cover_image,
                is_draft: payload.is_draft,
            },
        )
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.posts.delete(&user, id).await?;
    Ok(Json(MessageResponse::new("Post deleted")))
}
