/// Routes for the authenticated caller: profile and session management.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::domain::Role;
use crate::error::{AppError, DatabaseError};
use crate::session::SessionService;
use crate::store::{fingerprint, UserStore};

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// True for the session the request was made with
    pub current: bool,
}

#[derive(Serialize)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

/// GET /api/me
pub async fn me(
    user: web::ReqData<AuthenticatedUser>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let record = users
        .find_by_id(user.user_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user.user_id)))?;

    Ok(HttpResponse::Ok().json(ProfileResponse {
        id: record.id,
        email: record.email,
        username: record.username,
        role: user.role,
    }))
}

/// GET /api/sessions
///
/// Active sessions of the caller, newest first.
pub async fn list_sessions(
    user: web::ReqData<AuthenticatedUser>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let current = fingerprint(&user.token);
    let body: Vec<SessionResponse> = sessions
        .active_sessions(user.user_id)
        .await?
        .into_iter()
        .map(|s| SessionResponse {
            id: s.id,
            created_at: s.created_at,
            expires_at: s.expires_at,
            current: s.fingerprint == current,
        })
        .collect();

    Ok(HttpResponse::Ok().json(body))
}

/// POST /api/sessions/revoke-all
///
/// Revokes every active session of the caller, including the one used for
/// this request.
pub async fn revoke_all(
    user: web::ReqData<AuthenticatedUser>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let revoked = sessions.logout_everywhere(user.user_id).await?;
    Ok(HttpResponse::Ok().json(RevokeAllResponse { revoked }))
}
