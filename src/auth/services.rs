use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::codes::{self, CodeStatus};
use crate::auth::password;
use crate::auth::repo::AccountStore;
use crate::auth::repo_types::{
    CodePurpose, NewUser, Role, SessionUser, UserChanges, VerificationCode,
};
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::mailer::{self, Mailer};

pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

pub struct UpdateUserInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Orchestrates registration, login, verification and password reset over the
/// account store, the verification-code lifecycle and the mailer.
///
/// Every user returned from here is the sanitized [`SessionUser`] projection;
/// the password hash stays behind this boundary.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    auth: AuthConfig,
    base_url: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        auth: AuthConfig,
        base_url: String,
    ) -> Self {
        Self {
            store,
            mailer,
            auth,
            base_url,
        }
    }

    /// Mail dispatch is fire-and-forget: the account mutation has already
    /// committed, so a delivery failure is logged and never surfaced.
    fn dispatch_email(&self, to: String, (subject, body): (String, String)) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, &body).await {
                warn!(error = %e, %to, "failed to send email");
            }
        });
    }

    /// Look up a code and require it to be valid for the given purpose. All
    /// failure shapes (unknown, expired, used, wrong purpose) collapse into
    /// `InvalidOrExpired` so a caller cannot probe which one occurred.
    async fn valid_code(
        &self,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<VerificationCode, ApiError> {
        let record = self
            .store
            .find_code(code)
            .await?
            .ok_or(ApiError::InvalidOrExpired)?;
        if record.purpose != purpose {
            return Err(ApiError::InvalidOrExpired);
        }
        if codes::status(&record, OffsetDateTime::now_utc()) != CodeStatus::Ok {
            return Err(ApiError::InvalidOrExpired);
        }
        Ok(record)
    }

    pub async fn register(&self, input: RegisterInput) -> Result<SessionUser, ApiError> {
        // Fast-path check only; the unique index on email is the
        // authoritative conflict signal under concurrent registration.
        if self.store.find_user_by_email(&input.email).await?.is_some() {
            return Err(ApiError::Conflict);
        }

        let password_hash = password::hash_password(&input.password, self.auth.hash_time_cost)?;
        let user_id = Uuid::new_v4();
        let code = codes::mint(
            user_id,
            CodePurpose::Register,
            self.auth.token_bytes,
            self.auth.code_ttl_minutes,
        );
        let new_user = NewUser {
            id: user_id,
            role: Role::User,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            password_hash,
        };

        let (user, code) = self.store.create_user_with_code(new_user, code).await?;
        info!(user_id = %user.id, email = %user.email, "user registered");

        self.dispatch_email(
            user.email.clone(),
            mailer::verification_email(&self.base_url, &code.code),
        );
        Ok(user.into())
    }

    pub async fn login(&self, email: &str, plain_password: &str) -> Result<SessionUser, ApiError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ApiError::NotFound)?;

        if !password::verify_password(plain_password, &user.password_hash)? {
            return Err(ApiError::InvalidCredentials);
        }
        if !user.is_verified {
            return Err(ApiError::NotVerified);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user.into())
    }

    /// Consume a registration code and flip the owning account to verified.
    /// One-way: there is no path back to unverified.
    pub async fn verify(&self, code: &str) -> Result<(), ApiError> {
        let record = self.valid_code(code, CodePurpose::Register).await?;
        self.store
            .consume_code_and_verify_user(record.id, record.user_id)
            .await?;
        info!(user_id = %record.user_id, "account verified");
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !user.is_verified {
            return Err(ApiError::NotVerified);
        }

        let code = codes::mint(
            user.id,
            CodePurpose::PasswordReset,
            self.auth.token_bytes,
            self.auth.code_ttl_minutes,
        );
        let code = self.store.insert_code(code).await?;
        info!(user_id = %user.id, "password reset requested");

        // The plaintext code leaves only through the email channel.
        self.dispatch_email(user.email.clone(), mailer::password_reset_email(&code.code));
        Ok(())
    }

    /// Pre-check for the change-password step: validates without consuming.
    pub async fn verify_password_reset(&self, code: &str) -> Result<(), ApiError> {
        self.valid_code(code, CodePurpose::PasswordReset).await?;
        Ok(())
    }

    pub async fn change_password(&self, code: &str, new_password: &str) -> Result<(), ApiError> {
        let record = self.valid_code(code, CodePurpose::PasswordReset).await?;
        let user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(ApiError::NotFound)?;

        password::validate_password(new_password).map_err(ApiError::Validation)?;
        let password_hash = password::hash_password(new_password, self.auth.hash_time_cost)?;

        self.store
            .consume_code_and_set_password(record.id, user.id, &password_hash)
            .await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<SessionUser>, ApiError> {
        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(SessionUser::from).collect())
    }

    pub async fn get_user(&self, id: Uuid) -> Result<SessionUser, ApiError> {
        let user = self
            .store
            .find_user_by_id(id)
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(user.into())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<SessionUser, ApiError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(user.into())
    }

    pub async fn update_user(
        &self,
        id: Uuid,
        input: UpdateUserInput,
    ) -> Result<SessionUser, ApiError> {
        let existing = self
            .store
            .find_user_by_id(id)
            .await?
            .ok_or(ApiError::NotFound)?;

        // Same fast-path-plus-unique-index arrangement as registration.
        if existing.email != input.email
            && self.store.find_user_by_email(&input.email).await?.is_some()
        {
            return Err(ApiError::Conflict);
        }

        let password_hash = password::hash_password(&input.password, self.auth.hash_time_cost)?;
        let changes = UserChanges {
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            password_hash,
        };
        let user = self.store.update_user(id, changes).await?;
        Ok(user.into())
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), ApiError> {
        if !self.store.delete_user(id).await? {
            return Err(ApiError::NotFound);
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{MemoryAccountStore, RecordingMailer};

    fn test_config() -> AuthConfig {
        AuthConfig {
            code_ttl_minutes: 60,
            token_bytes: 32,
            session_ttl_minutes: 60,
            hash_time_cost: 1,
        }
    }

    fn service() -> (AccountService, Arc<MemoryAccountStore>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryAccountStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let svc = AccountService::new(
            store.clone(),
            mailer.clone(),
            test_config(),
            "http://localhost:8080".into(),
        );
        (svc, store, mailer)
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            password: "Abcd1234".into(),
        }
    }

    async fn wait_for_mail(mailer: &RecordingMailer, count: usize) {
        for _ in 0..200 {
            if mailer.sent().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} emails, got {}", mailer.sent().len());
    }

    #[tokio::test]
    async fn register_creates_unverified_user_with_pending_code() {
        let (svc, store, mailer) = service();
        let user = svc.register(register_input("a@x.com")).await.unwrap();

        assert!(!user.is_verified);
        assert_eq!(user.role, Role::User);

        let codes = store.codes();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].user_id, user.id);
        assert_eq!(codes[0].purpose, CodePurpose::Register);
        assert!(!codes[0].is_used);
        assert_eq!(
            codes[0].expires_at - codes[0].created_at,
            time::Duration::minutes(60)
        );

        // The verification email carries the plaintext code.
        wait_for_mail(&mailer, 1).await;
        let (to, subject, body) = mailer.sent().remove(0);
        assert_eq!(to, "a@x.com");
        assert!(subject.contains("Verify"));
        assert!(body.contains(&codes[0].code));
    }

    #[tokio::test]
    async fn register_duplicate_email_conflicts_and_keeps_one_row() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let err = svc.register(register_input("a@x.com")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict));
        assert_eq!(store.users().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_registrations_keep_a_single_row() {
        let (svc, store, _mailer) = service();
        let (a, b) = tokio::join!(
            svc.register(register_input("a@x.com")),
            svc.register(register_input("a@x.com"))
        );
        // Exactly one attempt wins; the loser sees the store's conflict
        // signal even though both may pass the fast-path check.
        assert!(a.is_ok() != b.is_ok());
        let err = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
        assert!(matches!(err, ApiError::Conflict));
        assert_eq!(store.users().len(), 1);
    }

    #[tokio::test]
    async fn login_distinguishes_missing_wrong_password_and_unverified() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();

        let err = svc.login("nobody@x.com", "Abcd1234").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let err = svc.login("a@x.com", "WrongPass1").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));

        let err = svc.login("a@x.com", "Abcd1234").await.unwrap_err();
        assert!(matches!(err, ApiError::NotVerified));

        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        let user = svc.login("a@x.com", "Abcd1234").await.unwrap();
        assert!(user.is_verified);
    }

    #[tokio::test]
    async fn login_payload_never_contains_the_hash() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();

        let user = svc.login("a@x.com", "Abcd1234").await.unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn verify_rejects_a_fabricated_code() {
        let (svc, _store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let err = svc.verify(&"0".repeat(64)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn verify_succeeds_once_then_fails() {
        let (svc, store, _mailer) = service();
        let user = svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);

        svc.verify(&code.code).await.unwrap();
        assert!(store.users().remove(0).is_verified);
        assert!(store.codes().remove(0).is_used);

        let err = svc.verify(&code.code).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));
        // still verified, no partial rollback
        assert!(svc.get_user(user.id).await.unwrap().is_verified);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_when_unused() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        store.expire_code(code.id);

        let err = svc.verify(&code.code).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));
        assert!(!store.users().remove(0).is_verified);
    }

    #[tokio::test]
    async fn code_purpose_must_match_the_flow() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let register_code = store.codes().remove(0);

        // A registration code is useless against the reset flow.
        let err = svc
            .verify_password_reset(&register_code.code)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));

        svc.verify(&register_code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();
        let reset_code = store.codes().remove(1);
        assert_eq!(reset_code.purpose, CodePurpose::PasswordReset);

        // And a reset code is useless against verify.
        let err = svc.verify(&reset_code.code).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn password_reset_requires_a_known_verified_user() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();

        let err = svc.request_password_reset("nobody@x.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let err = svc.request_password_reset("a@x.com").await.unwrap_err();
        assert!(matches!(err, ApiError::NotVerified));

        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();
        assert_eq!(store.codes().len(), 2);
    }

    #[tokio::test]
    async fn reset_precheck_does_not_consume_the_code() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();

        let reset_code = store.codes().remove(1);
        svc.verify_password_reset(&reset_code.code).await.unwrap();
        svc.verify_password_reset(&reset_code.code).await.unwrap();
        assert!(!store.codes().remove(1).is_used);
    }

    #[tokio::test]
    async fn change_password_swaps_the_hash_and_consumes_the_code() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();
        let reset_code = store.codes().remove(1);

        svc.change_password(&reset_code.code, "NewPass99").await.unwrap();

        let err = svc.login("a@x.com", "Abcd1234").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
        svc.login("a@x.com", "NewPass99").await.unwrap();
        assert!(store.codes().remove(1).is_used);
    }

    #[tokio::test]
    async fn change_password_with_a_used_code_leaves_the_password_alone() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();
        let reset_code = store.codes().remove(1);

        svc.change_password(&reset_code.code, "NewPass99").await.unwrap();
        let err = svc
            .change_password(&reset_code.code, "OtherPass7")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOrExpired));

        // first change sticks, second never happened
        svc.login("a@x.com", "NewPass99").await.unwrap();
        let err = svc.login("a@x.com", "OtherPass7").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn change_password_enforces_the_policy_without_burning_the_code() {
        let (svc, store, _mailer) = service();
        svc.register(register_input("a@x.com")).await.unwrap();
        let code = store.codes().remove(0);
        svc.verify(&code.code).await.unwrap();
        svc.request_password_reset("a@x.com").await.unwrap();
        let reset_code = store.codes().remove(1);

        let err = svc.change_password(&reset_code.code, "weak").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(!store.codes().remove(1).is_used);

        // the code survives for a second, valid attempt
        svc.change_password(&reset_code.code, "NewPass99").await.unwrap();
    }

    #[tokio::test]
    async fn user_crud_paths_return_sanitized_users() {
        let (svc, _store, _mailer) = service();
        let created = svc.register(register_input("a@x.com")).await.unwrap();
        svc.register(register_input("b@x.com")).await.unwrap();

        let listed = svc.list_users().await.unwrap();
        assert_eq!(listed.len(), 2);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("password"));

        let fetched = svc.get_user(created.id).await.unwrap();
        assert_eq!(fetched.email, "a@x.com");
        let by_email = svc.get_user_by_email("b@x.com").await.unwrap();
        assert_eq!(by_email.email, "b@x.com");

        let updated = svc
            .update_user(
                created.id,
                UpdateUserInput {
                    first_name: "Augusta".into(),
                    last_name: "King".into(),
                    email: "a@x.com".into(),
                    password: "Abcd1234".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Augusta");

        // updating onto an existing email conflicts
        let err = svc
            .update_user(
                created.id,
                UpdateUserInput {
                    first_name: "Augusta".into(),
                    last_name: "King".into(),
                    email: "b@x.com".into(),
                    password: "Abcd1234".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict));

        svc.delete_user(created.id).await.unwrap();
        let err = svc.get_user(created.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        let err = svc.delete_user(created.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
