//! Persistence seams for the session core.
//!
//! `UserStore` and `TokenLedger` are the only ways the core touches storage.
//! Both have a PostgreSQL implementation and an in-memory one; the in-memory
//! one backs `application.storage = "memory"` and the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{AuditRecord, NewUser, Role, SessionRecord, SweepReport, User};
use crate::error::AppError;

mod memory;
mod postgres;

pub use memory::{InMemoryTokenLedger, InMemoryUserStore};
pub use postgres::{PgTokenLedger, PgUserStore};

/// Lookup and creation of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-sensitive exact match on the unique email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Fails with `DatabaseError::UniqueConstraintViolation` on a taken email.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;
}

/// Durable record of issued tokens and the state of each session.
///
/// Every method takes the raw bearer token and stores or looks up its
/// [`fingerprint`]. The unique constraint on the fingerprint serializes
/// concurrent inserts of the same token.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Append to the audit log. Must succeed before `activate` is called.
    async fn record_issued(
        &self,
        token: &str,
        user_id: Uuid,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Start an active session for an already recorded token.
    async fn activate(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Whether the session is active. Expiry is not considered here.
    async fn is_active(&self, token: &str) -> Result<bool, AppError>;

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError>;

    /// Atomically mark the token revoked. Unknown tokens get a revoked row
    /// carrying `expires_at`; known ones keep their original expiry.
    /// Idempotent.
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Mark an active session expired after its natural expiry was observed.
    /// Sessions in any other state are left alone.
    async fn expire(&self, token: &str) -> Result<(), AppError>;

    /// Revoke every active session of `user_id`, returning how many changed.
    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Active, unexpired sessions of `user_id`, newest first.
    async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AppError>;

    /// Audit entries for `user_id`, newest first.
    async fn issued_tokens(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError>;

    /// Delete sessions of any state whose expiry is before `now`.
    /// The audit log is never swept.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError>;
}

/// SHA-256 hex digest of a token. Tokens are never stored in plaintext.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 64);
    }

    #[test]
    fn test_different_tokens_different_fingerprints() {
        assert_ne!(fingerprint("token-a"), fingerprint("token-b"));
        assert_ne!(fingerprint("token-a"), "token-a");
    }
}
