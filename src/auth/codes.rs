use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::repo_types::{CodePurpose, VerificationCode};
use crate::auth::token;

/// Outcome of a pure validity check; no state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    Ok,
    Expired,
    AlreadyUsed,
}

/// Build a fresh verification code for a user. The caller persists it:
/// registration inserts it in the same transaction as the user row, password
/// reset inserts it on its own.
pub fn mint(
    user_id: Uuid,
    purpose: CodePurpose,
    token_bytes: usize,
    ttl_minutes: i64,
) -> VerificationCode {
    let now = OffsetDateTime::now_utc();
    VerificationCode {
        id: Uuid::new_v4(),
        user_id,
        purpose,
        code: token::generate(token_bytes),
        is_used: false,
        used_at: None,
        created_at: now,
        expires_at: now + Duration::minutes(ttl_minutes),
    }
}

/// Check a code against the clock. Expiry wins over the used flag: an expired
/// code reports `Expired` no matter what `is_used` says.
pub fn status(code: &VerificationCode, now: OffsetDateTime) -> CodeStatus {
    if now > code.expires_at {
        CodeStatus::Expired
    } else if code.is_used {
        CodeStatus::AlreadyUsed
    } else {
        CodeStatus::Ok
    }
}
