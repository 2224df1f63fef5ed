use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Role;

/// Lifecycle state of a tracked token.
///
/// `Active` and `Revoked` are the two states validation cares about: a token
/// is usable only while `Active`, and always rejected once `Revoked`.
/// `Expired` marks sessions whose natural expiry was observed before they
/// were revoked or swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Revoked,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Revoked => "revoked",
            SessionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "revoked" => Ok(SessionStatus::Revoked),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status `{}`", other)),
        }
    }
}

/// One tracked token. The token itself is only kept as a fingerprint.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    /// `None` for revocations of tokens the ledger never saw issued.
    pub user_id: Option<Uuid>,
    pub fingerprint: String,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry written once per successful issuance.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub fingerprint: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Rows removed by one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active or expired sessions past their expiry
    pub sessions: u64,
    /// Revocations past the expiry of the token they block
    pub revocations: u64,
}
