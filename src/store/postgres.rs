use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    AuditRecord, NewUser, Role, SessionRecord, SessionStatus, SweepReport, User,
};
use crate::error::{AppError, DatabaseError};
use crate::store::{fingerprint, TokenLedger, UserStore};

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = r#"
    u.id, u.email, u.username, u.password_hash, u.role_id,
    r.name AS role_name, u.created_at
"#;

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, role_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(new_user.role.id())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            role_id: new_user.role.id(),
            role_name: new_user.role.as_str().to_string(),
            created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgTokenLedger {
    pool: PgPool,
}

impl PgTokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn has_status(&self, token: &str, status: SessionStatus) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM sessions WHERE token_hash = $1 AND status = $2)",
        )
        .bind(fingerprint(token))
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Option<Uuid>,
    token_hash: String,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| AppError::Database(DatabaseError::UnexpectedError(e)))?;
        Ok(SessionRecord {
            id: row.id,
            user_id: row.user_id,
            fingerprint: row.token_hash,
            status,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: crate::domain::UnknownRole| {
                AppError::Database(DatabaseError::UnexpectedError(e.to_string()))
            })?;
        Ok(AuditRecord {
            id: row.id,
            user_id: row.user_id,
            fingerprint: row.token_hash,
            role,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl TokenLedger for PgTokenLedger {
    async fn record_issued(
        &self,
        token: &str,
        user_id: Uuid,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO issued_tokens (id, user_id, token_hash, role, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(fingerprint(token))
        .bind(role.as_str())
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activate(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'active', $4, $5, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(fingerprint(token))
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_active(&self, token: &str) -> Result<bool, AppError> {
        self.has_status(token, SessionStatus::Active).await
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        self.has_status(token, SessionStatus::Revoked).await
    }

    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        // One statement: there is no instant where the token is neither
        // active nor revoked.
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, status, expires_at, created_at, updated_at)
            VALUES ($1, NULL, $2, 'revoked', $3, $4, $4)
            ON CONFLICT (token_hash)
            DO UPDATE SET status = 'revoked', updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(fingerprint(token))
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn expire(&self, token: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sessions SET status = 'expired', updated_at = $2
            WHERE token_hash = $1 AND status = 'active'
            "#,
        )
        .bind(fingerprint(token))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET status = 'revoked', updated_at = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, token_hash, status, expires_at, created_at, updated_at
            FROM sessions
            WHERE user_id = $1 AND status = 'active' AND expires_at > $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    async fn issued_tokens(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, token_hash, role, created_at, expires_at
            FROM issued_tokens
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut tx = self.pool.begin().await?;

        let sessions = sqlx::query(
            "DELETE FROM sessions WHERE expires_at < $1 AND status IN ('active', 'expired')",
        )
        .bind(now)
        .execute(&mut tx)
        .await?
        .rows_affected();

        let revocations =
            sqlx::query("DELETE FROM sessions WHERE expires_at < $1 AND status = 'revoked'")
                .bind(now)
                .execute(&mut tx)
                .await?
                .rows_affected();

        tx.commit().await?;

        Ok(SweepReport {
            sessions,
            revocations,
        })
    }
}
