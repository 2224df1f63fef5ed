mod admin;
mod auth;
mod health_check;
mod sessions;

pub use admin::{sweep, user_tokens};
pub use auth::{login, logout, method_not_allowed, not_found, register};
pub use health_check::health_check;
pub use sessions::{list_sessions, me, revoke_all};
