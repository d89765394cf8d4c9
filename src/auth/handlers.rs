use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration;
use tracing::warn;

use crate::auth::dto::{
    ChangePasswordRequest, LoginRequest, MessageResponse, PasswordResetRequest, RegisterRequest,
    UpdateProfileRequest, VerifyRequest,
};
use crate::auth::password;
use crate::auth::repo_types::SessionUser;
use crate::auth::services::{RegisterInput, UpdateUserInput};
use crate::auth::session::{self, CurrentUser, SESSION_COOKIE};
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 64 && EMAIL_RE.is_match(email)
}

fn validate_name(field: &str, value: &str) -> Result<(), ApiError> {
    if value.len() < 2 || value.len() > 64 {
        return Err(ApiError::Validation(format!(
            "{field} must be between 2 and 64 characters long"
        )));
    }
    Ok(())
}

/// Codes are hex tokens; anything else can be rejected without a lookup. The
/// rejection is the same `InvalidOrExpired` a wrong code would get.
fn validate_code_shape(code: &str) -> Result<(), ApiError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::InvalidOrExpired);
    }
    Ok(())
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/account/register", post(register))
        .route("/account/login", post(login))
        .route("/account/logout", post(logout))
        .route("/account/verify", get(verify_link).post(verify))
        .route("/account/me", get(me).put(update_me))
        .route("/account/password-reset", post(password_reset_request))
        .route("/account/password-reset/verify", post(password_reset_verify))
        .route("/account/password-reset/change", post(password_reset_change))
}

pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionUser>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email on register");
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    validate_name("First name", payload.first_name.trim())?;
    validate_name("Last name", payload.last_name.trim())?;
    password::validate_password(&payload.password).map_err(ApiError::Validation)?;
    if payload.password != payload.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }

    let user = state
        .accounts
        .register(RegisterInput {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionUser>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    let user = state.accounts.login(&payload.email, &payload.password).await?;
    let session_id = state.sessions.insert(user.clone()).await;
    let jar = jar.add(session::session_cookie(
        session_id,
        Duration::minutes(state.config.auth.session_ttl_minutes),
    ));
    Ok((jar, Json(user)))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value()).await;
    }
    let jar = jar.add(session::clear_session_cookie());
    (jar, Json(MessageResponse::new("Logged out")))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_code_shape(&payload.code)?;
    state.accounts.verify(&payload.code).await?;
    Ok(Json(MessageResponse::new("Account verified")))
}

/// Same operation as [`verify`], reachable from the link in the
/// verification email.
pub async fn verify_link(
    State(state): State<AppState>,
    Query(query): Query<VerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_code_shape(&query.code)?;
    state.accounts.verify(&query.code).await?;
    Ok(Json(MessageResponse::new("Account verified")))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<SessionUser> {
    Json(user)
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<UpdateProfileRequest>,
) -> Result<Json<SessionUser>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    validate_name("First name", payload.first_name.trim())?;
    validate_name("Last name", payload.last_name.trim())?;
    password::validate_password(&payload.password).map_err(ApiError::Validation)?;
    if payload.password != payload.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }

    let updated = state
        .accounts
        .update_user(
            user.id,
            UpdateUserInput {
                first_name: payload.first_name.trim().to_string(),
                last_name: payload.last_name.trim().to_string(),
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;
    Ok(Json(updated))
}

pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(mut payload): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    state.accounts.request_password_reset(&payload.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

pub async fn password_reset_verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_code_shape(&payload.code)?;
    state.accounts.verify_password_reset(&payload.code).await?;
    Ok(Json(MessageResponse::new("Verification code valid")))
}

pub async fn password_reset_change(
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_code_shape(&payload.code)?;
    if payload.password != payload.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    state
        .accounts
        .change_password(&payload.code, &payload.password)
        .await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
