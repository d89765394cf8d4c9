use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User, UserChanges, VerificationCode};
use crate::error::ApiError;

/// Persistence port for users and verification codes.
///
/// Multi-row invariants are composite methods so the transaction stays inside
/// the store: user+code creation and code consumption either fully commit or
/// leave nothing behind.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError>;
    async fn list_users(&self) -> Result<Vec<User>, ApiError>;

    /// Insert the user row and its registration code in one transaction.
    /// A duplicate email surfaces as `Conflict` via the unique index.
    async fn create_user_with_code(
        &self,
        user: NewUser,
        code: VerificationCode,
    ) -> Result<(User, VerificationCode), ApiError>;

    /// Full-row profile update; an email collision surfaces as `Conflict`.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, ApiError>;

    /// Returns `false` when no such user existed.
    async fn delete_user(&self, id: Uuid) -> Result<bool, ApiError>;

    async fn find_code(&self, code: &str) -> Result<Option<VerificationCode>, ApiError>;
    async fn insert_code(&self, code: VerificationCode) -> Result<VerificationCode, ApiError>;

    /// Mark the code used and flip the user to verified, atomically. Fails
    /// with `InvalidOrExpired` when a concurrent consumer got there first.
    async fn consume_code_and_verify_user(
        &self,
        code_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ApiError>;

    /// Mark the code used and swap the user's password hash, atomically.
    async fn consume_code_and_set_password(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError>;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

fn conflict_or_internal(err: sqlx::Error, what: &'static str) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::Conflict
    } else {
        ApiError::Internal(anyhow::Error::new(err).context(what))
    }
}

#[derive(Clone)]
pub struct PgAccountStore {
    pub db: PgPool,
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, role, first_name, last_name, email, password_hash,
                   is_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, role, first_name, last_name, email, password_hash,
                   is_verified, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, role, first_name, last_name, email, password_hash,
                   is_verified, created_at, updated_at
            FROM users
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(users)
    }

    async fn create_user_with_code(
        &self,
        user: NewUser,
        code: VerificationCode,
    ) -> Result<(User, VerificationCode), ApiError> {
        let mut tx = self.db.begin().await.context("begin register transaction")?;

        let inserted_user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, role, first_name, last_name, email, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, role, first_name, last_name, email, password_hash,
                      is_verified, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(user.role)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_internal(e, "insert user"))?;

        let inserted_code = sqlx::query_as::<_, VerificationCode>(
            r#"
            INSERT INTO verification_codes (id, user_id, purpose, code, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, purpose, code, is_used, used_at, created_at, expires_at
            "#,
        )
        .bind(code.id)
        .bind(code.user_id)
        .bind(code.purpose)
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expires_at)
        .fetch_one(&mut *tx)
        .await
        .context("insert verification code")?;

        tx.commit().await.context("commit register transaction")?;
        Ok((inserted_user, inserted_code))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, password_hash = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING id, role, first_name, last_name, email, password_hash,
                      is_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| conflict_or_internal(e, "update user"))?;
        user.ok_or(ApiError::NotFound)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_code(&self, code: &str) -> Result<Option<VerificationCode>, ApiError> {
        let record = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, user_id, purpose, code, is_used, used_at, created_at, expires_at
            FROM verification_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await
        .context("find verification code")?;
        Ok(record)
    }

    async fn insert_code(&self, code: VerificationCode) -> Result<VerificationCode, ApiError> {
        let record = sqlx::query_as::<_, VerificationCode>(
            r#"
            INSERT INTO verification_codes (id, user_id, purpose, code, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, purpose, code, is_used, used_at, created_at, expires_at
            "#,
        )
        .bind(code.id)
        .bind(code.user_id)
        .bind(code.purpose)
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expires_at)
        .fetch_one(&self.db)
        .await
        .context("insert verification code")?;
        Ok(record)
    }

    async fn consume_code_and_verify_user(
        &self,
        code_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ApiError> {
        let mut tx = self.db.begin().await.context("begin verify transaction")?;

        // `is_used = FALSE` in the predicate makes concurrent consumption a
        // clean loss: zero rows means someone else already burned the code.
        let consumed = sqlx::query(
            r#"
            UPDATE verification_codes
            SET is_used = TRUE, used_at = now()
            WHERE id = $1 AND is_used = FALSE
            "#,
        )
        .bind(code_id)
        .execute(&mut *tx)
        .await
        .context("consume verification code")?;

        if consumed.rows_affected() == 0 {
            return Err(ApiError::InvalidOrExpired);
        }

        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("mark user verified")?;

        tx.commit().await.context("commit verify transaction")?;
        Ok(())
    }

    async fn consume_code_and_set_password(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.db.begin().await.context("begin password change transaction")?;

        let consumed = sqlx::query(
            r#"
            UPDATE verification_codes
            SET is_used = TRUE, used_at = now()
            WHERE id = $1 AND is_used = FALSE
            "#,
        )
        .bind(code_id)
        .execute(&mut *tx)
        .await
        .context("consume verification code")?;

        if consumed.rows_affected() == 0 {
            return Err(ApiError::InvalidOrExpired);
        }

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .context("update password hash")?;

        tx.commit()
            .await
            .context("commit password change transaction")?;
        Ok(())
    }
}
