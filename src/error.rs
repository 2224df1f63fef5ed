/// Error Handling Module
///
/// One application error type with domain-specific sub-enums. Every core
/// operation returns `Result<_, AppError>`; the HTTP boundary maps the
/// variant to a status code and a client-safe message, and logs the
/// internal detail under a generated error id.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data (400)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid request parameter: {0}")]
    InvalidParameter(String),
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
}

/// Authentication (401) and authorization (403) failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User has no valid role assignment")]
    InvalidRole,
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token is malformed")]
    MalformedToken,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Session is not active")]
    SessionInactive,
    #[error("Role is not permitted for this resource")]
    InsufficientRole,
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Carries the name of the violated constraint
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    UnexpectedError(String),
}

/// Failures of collaborators the session core depends on (500)
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Token signing failed: {0}")]
    Signing(String),
    #[error("Session could not be persisted: {0}")]
    SessionPersist(String),
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps any error raised while writing a freshly issued token to the
    /// ledger. The token is unusable afterwards.
    pub fn session_persist(err: AppError) -> Self {
        AppError::Dependency(DependencyError::SessionPersist(err.to_string()))
    }
}

const UNIQUE_VIOLATION: &str = "23505";

/// Unique index on `users.email`
pub const USERS_EMAIL_CONSTRAINT: &str = "users_email_key";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                let constraint = db_err.constraint().unwrap_or_else(|| db_err.message());
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    constraint.to_string(),
                ))
            }
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(DatabaseError::Migration(err.to_string()))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// JSON error body returned to clients
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Client-safe message
    pub error: String,
    /// Machine-readable code
    pub code: &'static str,
    /// Correlates the response with the server-side log line
    pub error_id: String,
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, error_id: &str);
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => {
                let message = match e {
                    ValidationError::MissingFields(msg) => msg.to_string(),
                    ValidationError::InvalidPayload(_) => "Invalid request payload".to_string(),
                    ValidationError::InvalidParameter(_) => {
                        "Invalid request parameter".to_string()
                    }
                    other => other.to_string(),
                };
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid username or password".to_string(),
                ),
                AuthError::InvalidRole => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_ROLE",
                    "Invalid user role".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Missing or invalid authorization header".to_string(),
                ),
                AuthError::TokenExpired => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_EXPIRED",
                    "Token has expired".to_string(),
                ),
                AuthError::InvalidSignature | AuthError::MalformedToken => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID",
                    "Invalid token".to_string(),
                ),
                AuthError::TokenRevoked => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_REVOKED",
                    "Token has been revoked".to_string(),
                ),
                AuthError::SessionInactive => (
                    StatusCode::UNAUTHORIZED,
                    "SESSION_INACTIVE",
                    "Session is not active".to_string(),
                ),
                AuthError::InsufficientRole => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Insufficient permissions".to_string(),
                ),
            },

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(constraint) => {
                    let message = if constraint == USERS_EMAIL_CONSTRAINT {
                        "Email already registered"
                    } else {
                        "Resource already exists"
                    };
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY", message.to_string())
                }
                DatabaseError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Resource not found".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Dependency(e) => {
                let message = match e {
                    DependencyError::Hashing(_) => "Could not hash password",
                    DependencyError::Signing(_) => "Could not create token",
                    DependencyError::SessionPersist(_) => "Could not store token",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DEPENDENCY_ERROR",
                    message.to_string(),
                )
            }

            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                "Method not allowed".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        (
            status,
            ErrorResponse {
                error: message,
                code,
                error_id: error_id.to_string(),
            },
        )
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(error_id = error_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(error_id = error_id, error = %e, "Database error");
            }
            AppError::Dependency(e) => {
                tracing::error!(error_id = error_id, error = %e, "Dependency failure");
            }
            AppError::MethodNotAllowed => {
                tracing::debug!(error_id = error_id, "Method not allowed");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &error_id);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}
