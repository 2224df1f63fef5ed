/// Password Hashing and Verification
///
/// bcrypt with the crate's vetted default cost. The salt is generated per
/// call and embedded in the returned hash.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, DependencyError};

/// Hash a password using bcrypt
///
/// # Errors
/// Returns `DependencyError::Hashing` if bcrypt fails (e.g. no entropy)
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| DependencyError::Hashing(e.to_string()).into())
}

/// Verify a password against its hash
///
/// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash).map_err(|e| DependencyError::Hashing(e.to_string()).into())
}
