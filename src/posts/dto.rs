use serde::Deserialize;

/// Request body for creating a post. New posts start as drafts unless the
/// author says otherwise.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub cover_image: String,
    pub is_draft: Option<bool>,
}

/// Partial update; omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub is_draft: Option<bool>,
}
