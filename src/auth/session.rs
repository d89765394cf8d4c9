use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use crate::auth::repo_types::{Role, SessionUser};
use crate::auth::token;
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "blog_session";

/// Session ids are 32 random bytes, same shape as verification tokens.
const SESSION_ID_BYTES: usize = 32;

/// Explicit session store keyed by an opaque session id. The sanitized
/// principal is stored at login and trusted as-is until logout or expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store the principal under a fresh session id and return the id.
    async fn insert(&self, user: SessionUser) -> String;
    async fn get(&self, session_id: &str) -> Option<SessionUser>;
    async fn remove(&self, session_id: &str);
}

struct SessionEntry {
    user: SessionUser,
    expires_at: OffsetDateTime,
}

/// In-process session store with per-entry expiry and lazy eviction.
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, user: SessionUser) -> String {
        let session_id = token::generate(SESSION_ID_BYTES);
        let entry = SessionEntry {
            user,
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };
        self.entries
            .write()
            .expect("session store lock poisoned")
            .insert(session_id.clone(), entry);
        session_id
    }

    async fn get(&self, session_id: &str) -> Option<SessionUser> {
        let now = OffsetDateTime::now_utc();
        let expired = {
            let entries = self.entries.read().expect("session store lock poisoned");
            match entries.get(session_id) {
                Some(entry) if now <= entry.expires_at => return Some(entry.user.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries
                .write()
                .expect("session store lock poisoned")
                .remove(session_id);
        }
        None
    }

    async fn remove(&self, session_id: &str) {
        self.entries
            .write()
            .expect("session store lock poisoned")
            .remove(session_id);
    }
}

pub fn session_cookie(session_id: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .max_age(max_age)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Resolves the session principal from the request cookie. Rejects with 401
/// when there is no cookie, or the session is unknown or expired.
#[derive(Debug)]
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or(ApiError::Unauthorized)?;
        let user = state
            .sessions
            .get(&session_id)
            .await
            .ok_or(ApiError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}

/// `CurrentUser` plus an admin role check.
#[derive(Debug)]
pub struct AdminUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
