//! In-memory fakes for the store and mailer seams, mirroring the semantics
//! the Postgres implementation gets from its constraints and transactions.

use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::repo::AccountStore;
use crate::auth::repo_types::{NewUser, User, UserChanges, VerificationCode};
use crate::error::ApiError;
use crate::mailer::Mailer;

#[derive(Default)]
pub struct MemoryAccountStore {
    users: Mutex<Vec<User>>,
    codes: Mutex<Vec<VerificationCode>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    pub fn codes(&self) -> Vec<VerificationCode> {
        self.codes.lock().unwrap().clone()
    }

    /// Push a code's expiry into the past, as if the TTL had elapsed.
    pub fn expire_code(&self, code_id: Uuid) {
        let mut codes = self.codes.lock().unwrap();
        let code = codes.iter_mut().find(|c| c.id == code_id).unwrap();
        code.expires_at = OffsetDateTime::now_utc() - Duration::minutes(1);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn create_user_with_code(
        &self,
        user: NewUser,
        code: VerificationCode,
    ) -> Result<(User, VerificationCode), ApiError> {
        let mut users = self.users.lock().unwrap();
        // the unique index on email
        if users.iter().any(|u| u.email == user.email) {
            return Err(ApiError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: user.id,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        users.push(row.clone());
        self.codes.lock().unwrap().push(code.clone());
        Ok((row, code))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, ApiError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.id != id && u.email == changes.email) {
            return Err(ApiError::Conflict);
        }
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(ApiError::NotFound)?;
        user.first_name = changes.first_name;
        user.last_name = changes.last_name;
        user.email = changes.email;
        user.password_hash = changes.password_hash;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, ApiError> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn find_code(&self, code: &str) -> Result<Option<VerificationCode>, ApiError> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn insert_code(&self, code: VerificationCode) -> Result<VerificationCode, ApiError> {
        self.codes.lock().unwrap().push(code.clone());
        Ok(code)
    }

    async fn consume_code_and_verify_user(
        &self,
        code_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ApiError> {
        {
            let mut codes = self.codes.lock().unwrap();
            let code = codes
                .iter_mut()
                .find(|c| c.id == code_id && !c.is_used)
                .ok_or(ApiError::InvalidOrExpired)?;
            code.is_used = true;
            code.used_at = Some(OffsetDateTime::now_utc());
        }
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("code owner missing")))?;
        user.is_verified = true;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn consume_code_and_set_password(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        {
            let mut codes = self.codes.lock().unwrap();
            let code = codes
                .iter_mut()
                .find(|c| c.id == code_id && !c.is_used)
                .ok_or(ApiError::InvalidOrExpired)?;
            code.is_used = true;
            code.used_at = Some(OffsetDateTime::now_utc());
        }
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("code owner missing")))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body_html.to_string()));
        Ok(())
    }
}
