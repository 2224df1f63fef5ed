/// Admin-only routes. The enclosing scope restricts them to `Role::Admin`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::session::SessionService;

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// GET /api/admin/users/{id}/tokens
///
/// Issuance history of one user, newest first. `limit` is clamped to
/// `1..=500`.
pub async fn user_tokens(
    path: web::Path<Uuid>,
    query: web::Query<AuditQuery>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let records = sessions.audit_trail(path.into_inner(), limit).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// POST /api/admin/sweep
pub async fn sweep(
    admin: web::ReqData<AuthenticatedUser>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    tracing::info!(admin_id = %admin.user_id, "Manual session sweep requested");
    let report = sessions.sweep().await?;
    Ok(HttpResponse::Ok().json(report))
}
