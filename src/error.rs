use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Domain error variants returned by the account and post services.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("email already registered")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("account is not verified")]
    NotVerified,
    #[error("invalid verification code or code has expired")]
    InvalidOrExpired,
    #[error("{0}")]
    Validation(String),
    #[error("not logged in")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotVerified => "NOT_VERIFIED",
            Self::InvalidOrExpired => "INVALID_OR_EXPIRED",
            Self::Validation(_) => "VALIDATION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotVerified | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidOrExpired | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are expected client outcomes and already visible in the request
        // trace; only internal errors carry an anyhow chain worth logging.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
