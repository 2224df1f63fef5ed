/// Domain types shared by the stores, the session service and the routes.

mod session;
mod user;

pub use session::{AuditRecord, SessionRecord, SessionStatus, SweepReport};
pub use user::{NewUser, Role, UnknownRole, User};
