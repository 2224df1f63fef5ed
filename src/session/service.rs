/// Session lifecycle: login, logout and per-user session management.
///
/// A session moves NoSession -> Pending (credentials submitted) -> Active
/// (token issued, recorded and activated) -> Revoked | Expired. A token is
/// only handed back to the caller once it has been durably recorded and
/// activated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{verify_password, Claims, TokenIssuer};
use crate::domain::{AuditRecord, Role, SessionRecord, SweepReport};
use crate::error::{AppError, AuthError};
use crate::store::{TokenLedger, UserStore};

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionService {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn TokenLedger>,
    issuer: Arc<TokenIssuer>,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn TokenLedger>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            users,
            ledger,
            issuer,
        }
    }

    /// Validate credentials and open a new session.
    ///
    /// Unknown email and wrong password both yield
    /// `AuthError::InvalidCredentials`.
    ///
    /// # Errors
    /// - `AuthError::InvalidCredentials`, `AuthError::InvalidRole`
    /// - `DependencyError::Signing` if the token cannot be signed
    /// - `DependencyError::SessionPersist` if recording or activation fails;
    ///   the signed token is discarded
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let role: Role = user.role_name.parse().map_err(|e| {
            tracing::warn!(user_id = %user.id, error = %e, "User has no usable role");
            AuthError::InvalidRole
        })?;

        let issued = self.issuer.issue(user.id, role, self.issuer.ttl())?;
        let expires_at = issued.claims.expires_at();

        self.ledger
            .record_issued(&issued.token, user.id, role, expires_at)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Failed to record issued token");
                AppError::session_persist(e)
            })?;

        self.ledger
            .activate(&issued.token, user.id, expires_at)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Failed to activate session");
                AppError::session_persist(e)
            })?;

        tracing::info!(user_id = %user.id, role = %role, "User logged in");

        Ok(LoginOutcome {
            token: issued.token,
            user_id: user.id,
            role,
            expires_at,
        })
    }

    /// Check that `token` was signed by this service, expired or not.
    pub fn verify_authentic(&self, token: &str) -> Result<Claims, AuthError> {
        self.issuer.parse_allow_expired(token)
    }

    /// Revoke `token`. Idempotent: revoking an unknown or already revoked
    /// token succeeds and leaves it blacklisted.
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let expires_at = self
            .issuer
            .parse_allow_expired(token)
            .map(|claims| claims.expires_at())
            .unwrap_or_else(|_| Utc::now() + self.issuer.ttl());

        self.ledger.revoke(token, expires_at).await?;
        tracing::info!("Session revoked");
        Ok(())
    }

    /// Revoke every active session of `user_id`
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.ledger.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All sessions revoked for user");
        Ok(revoked)
    }

    pub async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AppError> {
        self.ledger.active_sessions(user_id).await
    }

    pub async fn audit_trail(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        self.ledger.issued_tokens(user_id, limit).await
    }

    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        sweep_ledger(self.ledger.as_ref()).await
    }
}

pub(crate) async fn sweep_ledger(ledger: &dyn TokenLedger) -> Result<SweepReport, AppError> {
    let report = ledger.sweep(Utc::now()).await?;
    tracing::info!(
        sessions = report.sessions,
        revocations = report.revocations,
        "Expired sessions swept"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use crate::domain::NewUser;
    use crate::error::{DatabaseError, DependencyError};
    use crate::store::{fingerprint, InMemoryTokenLedger, InMemoryUserStore};
    use async_trait::async_trait;
    use chrono::Duration;

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(&JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            token_ttl_seconds: 7200,
            issuer: "test".to_string(),
        }))
    }

    async fn user_store_with(email: &str, password: &str, role: Role) -> Arc<InMemoryUserStore> {
        let users = Arc::new(InMemoryUserStore::new());
        users
            .create(NewUser {
                email: email.to_string(),
                username: "a".to_string(),
                password_hash: bcrypt::hash(password, 4).unwrap(),
                role,
            })
            .await
            .unwrap();
        users
    }

    async fn service() -> (SessionService, Arc<InMemoryTokenLedger>) {
        let users = user_store_with("a@x.com", "secret", Role::User).await;
        let ledger = Arc::new(InMemoryTokenLedger::new());
        (SessionService::new(users, ledger.clone(), issuer()), ledger)
    }

    #[tokio::test]
    async fn test_login_records_and_activates_token() {
        let (service, ledger) = service().await;

        let outcome = service.login("a@x.com", "secret").await.unwrap();

        assert!(!outcome.token.is_empty());
        assert_eq!(outcome.role, Role::User);
        assert!(ledger.is_active(&outcome.token).await.unwrap());
        assert!(!ledger.is_blacklisted(&outcome.token).await.unwrap());

        let audit = ledger.issued_tokens(outcome.user_id, 10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].fingerprint, fingerprint(&outcome.token));

        let claims = issuer().parse(&outcome.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), outcome.user_id);
        assert_eq!(claims.exp - claims.iat, 7200);
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_the_same() {
        let (service, _) = service().await;

        let unknown = service.login("nobody@x.com", "secret").await.unwrap_err();
        let wrong = service.login("a@x.com", "not-secret").await.unwrap_err();

        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_email_match_is_case_sensitive() {
        let (service, _) = service().await;
        let result = service.login("A@X.com", "secret").await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    /// User store returning a user whose role name the service does not know
    struct UnknownRoleStore;

    #[async_trait]
    impl UserStore for UnknownRoleStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<crate::domain::User>, AppError> {
            Ok(Some(crate::domain::User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                username: "ghost".to_string(),
                password_hash: bcrypt::hash("secret", 4).unwrap(),
                role_id: 99,
                role_name: "guest".to_string(),
                created_at: Utc::now(),
            }))
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<crate::domain::User>, AppError> {
            Ok(None)
        }

        async fn create(&self, _user: NewUser) -> Result<crate::domain::User, AppError> {
            Err(AppError::Internal("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn test_user_without_known_role_cannot_log_in() {
        let ledger = Arc::new(InMemoryTokenLedger::new());
        let service = SessionService::new(Arc::new(UnknownRoleStore), ledger, issuer());

        let result = service.login("ghost@x.com", "secret").await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidRole))));
    }

    /// Ledger that can be told to fail at one of the two write steps
    struct FailingLedger {
        inner: InMemoryTokenLedger,
        fail_record: bool,
        fail_activate: bool,
    }

    #[async_trait]
    impl TokenLedger for FailingLedger {
        async fn record_issued(
            &self,
            token: &str,
            user_id: Uuid,
            role: Role,
            expires_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            if self.fail_record {
                return Err(DatabaseError::ConnectionPool("down".to_string()).into());
            }
            self.inner.record_issued(token, user_id, role, expires_at).await
        }

        async fn activate(
            &self,
            token: &str,
            user_id: Uuid,
            expires_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            if self.fail_activate {
                return Err(DatabaseError::ConnectionPool("down".to_string()).into());
            }
            self.inner.activate(token, user_id, expires_at).await
        }

        async fn is_active(&self, token: &str) -> Result<bool, AppError> {
            self.inner.is_active(token).await
        }

        async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
            self.inner.is_blacklisted(token).await
        }

        async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
            self.inner.revoke(token, expires_at).await
        }

        async fn expire(&self, token: &str) -> Result<(), AppError> {
            self.inner.expire(token).await
        }

        async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
            self.inner.revoke_all(user_id).await
        }

        async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AppError> {
            self.inner.active_sessions(user_id).await
        }

        async fn issued_tokens(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
            self.inner.issued_tokens(user_id, limit).await
        }

        async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
            self.inner.sweep(now).await
        }
    }

    #[tokio::test]
    async fn test_login_fails_closed_when_audit_write_fails() {
        let users = user_store_with("a@x.com", "secret", Role::User).await;
        let user_id = users.find_by_email("a@x.com").await.unwrap().unwrap().id;
        let ledger = Arc::new(FailingLedger {
            inner: InMemoryTokenLedger::new(),
            fail_record: true,
            fail_activate: false,
        });
        let service = SessionService::new(users, ledger.clone(), issuer());

        let result = service.login("a@x.com", "secret").await;

        assert!(matches!(
            result,
            Err(AppError::Dependency(DependencyError::SessionPersist(_)))
        ));
        assert!(ledger.active_sessions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_fails_when_activation_fails_leaving_orphan_audit() {
        let users = user_store_with("a@x.com", "secret", Role::User).await;
        let user_id = users.find_by_email("a@x.com").await.unwrap().unwrap().id;
        let ledger = Arc::new(FailingLedger {
            inner: InMemoryTokenLedger::new(),
            fail_record: false,
            fail_activate: true,
        });
        let service = SessionService::new(users, ledger.clone(), issuer());

        let result = service.login("a@x.com", "secret").await;

        assert!(matches!(
            result,
            Err(AppError::Dependency(DependencyError::SessionPersist(_)))
        ));
        assert_eq!(ledger.issued_tokens(user_id, 10).await.unwrap().len(), 1);
        assert!(ledger.active_sessions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (service, ledger) = service().await;
        let outcome = service.login("a@x.com", "secret").await.unwrap();

        service.logout(&outcome.token).await.unwrap();
        service.logout(&outcome.token).await.unwrap();
        service.logout("never-issued").await.unwrap();

        for token in [outcome.token.as_str(), "never-issued"] {
            assert!(!ledger.is_active(token).await.unwrap());
            assert!(ledger.is_blacklisted(token).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_concurrent_logins_are_independent() {
        let (service, ledger) = service().await;

        let (first, second) = tokio::join!(
            service.login("a@x.com", "secret"),
            service.login("a@x.com", "secret")
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_ne!(first.token, second.token);
        assert!(ledger.is_active(&first.token).await.unwrap());
        assert!(ledger.is_active(&second.token).await.unwrap());

        service.logout(&first.token).await.unwrap();
        assert!(ledger.is_blacklisted(&first.token).await.unwrap());
        assert!(ledger.is_active(&second.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_everywhere_and_listing() {
        let (service, _) = service().await;
        let first = service.login("a@x.com", "secret").await.unwrap();
        service.login("a@x.com", "secret").await.unwrap();

        assert_eq!(service.active_sessions(first.user_id).await.unwrap().len(), 2);
        assert_eq!(service.logout_everywhere(first.user_id).await.unwrap(), 2);
        assert!(service.active_sessions(first.user_id).await.unwrap().is_empty());
        assert_eq!(service.audit_trail(first.user_id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_verify_authentic_accepts_expired_tokens() {
        let (service, _) = service().await;
        let expired = issuer()
            .issue(Uuid::new_v4(), Role::User, Duration::seconds(-30))
            .unwrap();

        assert!(service.verify_authentic(&expired.token).is_ok());
        assert_eq!(
            service.verify_authentic("garbage"),
            Err(AuthError::MalformedToken)
        );
    }
}
