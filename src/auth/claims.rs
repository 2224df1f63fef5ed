/// JWT Claims structure
///
/// The signed payload of a session token: identity, role and the standard
/// time claims (RFC 7519).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Role;
use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Role name
    pub role: String,
    /// Unique token id; keeps tokens issued in the same second distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create claims valid from now for `ttl`
    pub fn new(user_id: Uuid, role: Role, ttl: Duration, issuer: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl.num_seconds(),
            iss: issuer.to_string(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::MalformedToken)
    }

    pub fn role(&self) -> Result<Role, AuthError> {
        self.role.parse().map_err(|_| AuthError::InvalidRole)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }
}
