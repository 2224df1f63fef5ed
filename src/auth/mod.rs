/// Authentication module
///
/// Password hashing, JWT issuance/parsing, and the typed identity that
/// authenticated requests carry.

mod claims;
mod identity;
mod jwt;
mod password;

pub use claims::Claims;
pub use identity::AuthenticatedUser;
pub use jwt::{IssuedToken, TokenIssuer};
pub use password::hash_password;
pub use password::verify_password;
