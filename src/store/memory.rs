use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    AuditRecord, NewUser, Role, SessionRecord, SessionStatus, SweepReport, User,
};
use crate::error::{AppError, DatabaseError, USERS_EMAIL_CONSTRAINT};
use crate::store::{fingerprint, TokenLedger, UserStore};

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                USERS_EMAIL_CONSTRAINT.to_string(),
            )
            .into());
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            role_id: new_user.role.id(),
            role_name: new_user.role.as_str().to_string(),
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Audit log keyed by fingerprint; append-only
    issued: HashMap<String, AuditRecord>,
    sessions: HashMap<String, SessionRecord>,
}

/// Ledger kept in process memory. A single lock guards both maps, so every
/// operation (including `revoke`) is one critical section.
#[derive(Debug, Default)]
pub struct InMemoryTokenLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn duplicate(table: &str) -> AppError {
        DatabaseError::UniqueConstraintViolation(format!("{}_token_hash_key", table)).into()
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn record_issued(
        &self,
        token: &str,
        user_id: Uuid,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let key = fingerprint(token);
        let mut state = self.state.write().await;
        if state.issued.contains_key(&key) {
            return Err(Self::duplicate("issued_tokens"));
        }

        state.issued.insert(
            key.clone(),
            AuditRecord {
                id: Uuid::new_v4(),
                user_id,
                fingerprint: key,
                role,
                created_at: Utc::now(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn activate(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let key = fingerprint(token);
        let mut state = self.state.write().await;
        if state.sessions.contains_key(&key) {
            return Err(Self::duplicate("sessions"));
        }

        let now = Utc::now();
        state.sessions.insert(
            key.clone(),
            SessionRecord {
                id: Uuid::new_v4(),
                user_id: Some(user_id),
                fingerprint: key,
                status: SessionStatus::Active,
                expires_at,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn is_active(&self, token: &str) -> Result<bool, AppError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(&fingerprint(token))
            .map_or(false, |s| s.status == SessionStatus::Active))
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(&fingerprint(token))
            .map_or(false, |s| s.status == SessionStatus::Revoked))
    }

    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let key = fingerprint(token);
        let now = Utc::now();
        let mut state = self.state.write().await;

        state
            .sessions
            .entry(key.clone())
            .and_modify(|s| {
                s.status = SessionStatus::Revoked;
                s.updated_at = now;
            })
            .or_insert_with(|| SessionRecord {
                id: Uuid::new_v4(),
                user_id: None,
                fingerprint: key,
                status: SessionStatus::Revoked,
                expires_at,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn expire(&self, token: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.get_mut(&fingerprint(token)) {
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Expired;
                session.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut revoked = 0;
        for session in state.sessions.values_mut() {
            if session.user_id == Some(user_id) && session.status == SessionStatus::Active {
                session.status = SessionStatus::Revoked;
                session.updated_at = now;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AppError> {
        let now = Utc::now();
        let state = self.state.read().await;
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .values()
            .filter(|s| {
                s.user_id == Some(user_id)
                    && s.status == SessionStatus::Active
                    && s.expires_at > now
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn issued_tokens(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let state = self.state.read().await;
        let mut records: Vec<AuditRecord> = state
            .issued
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut state = self.state.write().await;
        let mut report = SweepReport::default();
        state.sessions.retain(|_, s| {
            if s.expires_at >= now {
                return true;
            }
            match s.status {
                SessionStatus::Revoked => report.revocations += 1,
                SessionStatus::Active | SessionStatus::Expired => report.sessions += 1,
            }
            false
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_two_hours() -> DateTime<Utc> {
        Utc::now() + Duration::hours(2)
    }

    async fn issued(ledger: &InMemoryTokenLedger, token: &str, user_id: Uuid) {
        let expires_at = in_two_hours();
        ledger
            .record_issued(token, user_id, Role::User, expires_at)
            .await
            .unwrap();
        ledger.activate(token, user_id, expires_at).await.unwrap();
    }

    #[tokio::test]
    async fn test_activated_token_is_active_and_not_blacklisted() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        issued(&ledger, "tok-1", user_id).await;

        assert!(ledger.is_active("tok-1").await.unwrap());
        assert!(!ledger.is_blacklisted("tok-1").await.unwrap());
        assert_eq!(ledger.issued_tokens(user_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recording_without_activation_is_not_active() {
        let ledger = InMemoryTokenLedger::new();
        ledger
            .record_issued("orphan", Uuid::new_v4(), Role::User, in_two_hours())
            .await
            .unwrap();

        assert!(!ledger.is_active("orphan").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_token_is_rejected() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        issued(&ledger, "tok-1", user_id).await;

        let again = ledger
            .record_issued("tok-1", user_id, Role::User, in_two_hours())
            .await;
        assert!(matches!(
            again,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
        assert!(ledger.activate("tok-1", user_id, in_two_hours()).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_from_any_prior_state() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        issued(&ledger, "active", user_id).await;
        issued(&ledger, "expired", user_id).await;
        ledger.expire("expired").await.unwrap();

        for token in ["active", "expired", "never-seen"] {
            ledger.revoke(token, in_two_hours()).await.unwrap();
            // second call must be a no-op
            ledger.revoke(token, in_two_hours()).await.unwrap();

            assert!(!ledger.is_active(token).await.unwrap(), "{}", token);
            assert!(ledger.is_blacklisted(token).await.unwrap(), "{}", token);
        }
    }

    #[tokio::test]
    async fn test_revoke_keeps_original_expiry() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::minutes(30);
        ledger.record_issued("tok", user_id, Role::User, expires_at).await.unwrap();
        ledger.activate("tok", user_id, expires_at).await.unwrap();

        ledger.revoke("tok", Utc::now() + Duration::days(1)).await.unwrap();

        // swept once the original expiry has passed
        let report = ledger.sweep(expires_at + Duration::seconds(1)).await.unwrap();
        assert_eq!(report.revocations, 1);
    }

    #[tokio::test]
    async fn test_expire_only_touches_active_sessions() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        issued(&ledger, "tok", user_id).await;
        ledger.revoke("tok", in_two_hours()).await.unwrap();

        ledger.expire("tok").await.unwrap();
        assert!(ledger.is_blacklisted("tok").await.unwrap());

        ledger.expire("unknown").await.unwrap();
        assert!(!ledger.is_blacklisted("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_only_hits_that_user() {
        let ledger = InMemoryTokenLedger::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        issued(&ledger, "a1", alice).await;
        issued(&ledger, "a2", alice).await;
        issued(&ledger, "b1", bob).await;

        assert_eq!(ledger.revoke_all(alice).await.unwrap(), 2);
        assert!(ledger.is_blacklisted("a1").await.unwrap());
        assert!(ledger.is_blacklisted("a2").await.unwrap());
        assert!(ledger.is_active("b1").await.unwrap());
        assert!(ledger.active_sessions(alice).await.unwrap().is_empty());
        assert_eq!(ledger.active_sessions(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_past_entries_and_keeps_audit() {
        let ledger = InMemoryTokenLedger::new();
        let user_id = Uuid::new_v4();
        let past = Utc::now() - Duration::minutes(1);
        ledger.record_issued("old", user_id, Role::User, past).await.unwrap();
        ledger.activate("old", user_id, past).await.unwrap();
        ledger.revoke("old-revoked", past).await.unwrap();
        issued(&ledger, "fresh", user_id).await;

        let report = ledger.sweep(Utc::now()).await.unwrap();

        assert_eq!(report, SweepReport { sessions: 1, revocations: 1 });
        assert!(!ledger.is_active("old").await.unwrap());
        assert!(!ledger.is_blacklisted("old-revoked").await.unwrap());
        assert!(ledger.is_active("fresh").await.unwrap());
        assert_eq!(ledger.issued_tokens(user_id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_user_store_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        let new_user = NewUser {
            email: "a@x.com".to_string(),
            username: "a".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        };

        let created = store.create(new_user.clone()).await.unwrap();
        assert_eq!(created.role_name, "user");
        assert!(store.create(new_user).await.is_err());

        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(store.find_by_email("A@X.COM").await.unwrap().is_none());
    }
}
