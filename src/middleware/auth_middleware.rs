/// Bearer Token Authentication Middleware
///
/// Validates the bearer token of every request in the wrapped scope and
/// injects an `AuthenticatedUser` into request extensions for use by route
/// handlers. Checks run in a fixed order: signature and expiry, blacklist,
/// active session, then the optional role allowlist.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;

use crate::auth::{AuthenticatedUser, TokenIssuer};
use crate::domain::Role;
use crate::error::{AppError, AuthError};
use crate::store::TokenLedger;

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::MissingToken)
}

/// Resolve a bearer token to the identity it authenticates.
///
/// An expired token is rejected even if its session is still marked active;
/// the session is moved to `Expired` on the way out.
pub async fn authenticate(
    issuer: &TokenIssuer,
    ledger: &dyn TokenLedger,
    token: &str,
) -> Result<AuthenticatedUser, AppError> {
    let claims = match issuer.parse(token) {
        Ok(claims) => claims,
        Err(AuthError::TokenExpired) => {
            if let Err(e) = ledger.expire(token).await {
                tracing::warn!(error = %e, "Failed to mark session expired");
            }
            return Err(AuthError::TokenExpired.into());
        }
        Err(e) => return Err(e.into()),
    };

    if ledger.is_blacklisted(token).await? {
        return Err(AuthError::TokenRevoked.into());
    }

    if !ledger.is_active(token).await? {
        return Err(AuthError::SessionInactive.into());
    }

    Ok(AuthenticatedUser {
        user_id: claims.user_id()?,
        role: claims.role()?,
        token: token.to_string(),
        expires_at: claims.expires_at(),
    })
}

struct AuthGate {
    issuer: Arc<TokenIssuer>,
    ledger: Arc<dyn TokenLedger>,
    allowed_roles: Option<Vec<Role>>,
}

/// Auth middleware for protecting a scope
pub struct AuthMiddleware {
    gate: Rc<AuthGate>,
}

impl AuthMiddleware {
    pub fn new(issuer: Arc<TokenIssuer>, ledger: Arc<dyn TokenLedger>) -> Self {
        Self {
            gate: Rc::new(AuthGate {
                issuer,
                ledger,
                allowed_roles: None,
            }),
        }
    }

    /// Only let these roles through; others get 403
    pub fn allow_roles(self, roles: &[Role]) -> Self {
        Self {
            gate: Rc::new(AuthGate {
                issuer: self.gate.issuer.clone(),
                ledger: self.gate.ledger.clone(),
                allowed_roles: Some(roles.to_vec()),
            }),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            gate: self.gate.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    gate: Rc<AuthGate>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            let token = bearer_token(req.headers()).map_err(AppError::from)?;
            let user = authenticate(&gate.issuer, gate.ledger.as_ref(), &token).await?;

            if let Some(roles) = &gate.allowed_roles {
                if !user.has_any_role(roles) {
                    tracing::warn!(
                        user_id = %user.user_id,
                        role = %user.role,
                        path = %req.path(),
                        "Role not permitted"
                    );
                    return Err(AppError::from(AuthError::InsufficientRole).into());
                }
            }

            tracing::debug!(user_id = %user.user_id, role = %user.role, "Token validated");
            req.extensions_mut().insert(user);

            service.call(req).await
        })
    }
}
