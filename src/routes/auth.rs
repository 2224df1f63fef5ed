/// Authentication Routes
///
/// Handles registration, login and logout. Login and logout delegate to
/// `SessionService`; registration writes straight to the user store.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::hash_password;
use crate::domain::{NewUser, Role};
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::middleware::bearer_token;
use crate::session::SessionService;
use crate::store::UserStore;
use crate::validators::{is_acceptable_password, is_valid_email, is_valid_username};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: LoginUser,
}

/// POST /register
///
/// Create an account with the default `user` role.
///
/// # Errors
/// - 400: missing fields or invalid email/username/password
/// - 409: email already registered
/// - 500: hashing or storage failure
pub async fn register(
    form: web::Json<RegisterRequest>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    if form.email.is_empty() || form.username.is_empty() || form.password.is_empty() {
        return Err(ValidationError::MissingFields(
            "Email, username, and password are required",
        )
        .into());
    }

    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    is_acceptable_password(&form.password)?;
    let password_hash = hash_password(&form.password)?;

    let user = users
        .create(NewUser {
            email,
            username,
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok(HttpResponse::Created().json(MessageResponse {
        message: "User registered successfully".to_string(),
    }))
}

/// POST /login
///
/// # Errors
/// - 400: missing fields
/// - 401: unknown email, wrong password or no usable role; the first two
///   share one message
/// - 500: token could not be created or stored
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    if form.email.is_empty() || form.password.is_empty() {
        return Err(ValidationError::MissingFields("Email and password are required").into());
    }

    let outcome = sessions.login(&form.email, &form.password).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        token: outcome.token,
        expires_at: outcome.expires_at,
        user: LoginUser {
            id: outcome.user_id,
            role: outcome.role,
        },
    }))
}

/// POST /logout
///
/// Revokes the presented token. Any token this service signed is accepted,
/// including expired and already revoked ones.
///
/// # Errors
/// - 401: missing header or a token that was not signed here
pub async fn logout(
    req: HttpRequest,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(req.headers())?;
    let claims = sessions.verify_authentic(&token)?;

    sessions.logout(&token).await?;
    tracing::info!(user_id = %claims.sub, "User logged out");

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Fallback for known paths hit with the wrong method
pub async fn method_not_allowed() -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed)
}

/// Fallback for paths no route matches
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(DatabaseError::NotFound(format!("no route for {}", req.path())).into())
}
