use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Role;

/// Identity attached to a request by the auth middleware.
///
/// Handlers receive it as `web::ReqData<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
    /// The bearer token the request was authenticated with
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}
