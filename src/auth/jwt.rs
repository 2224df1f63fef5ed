/// JWT Token Issuance and Parsing
///
/// `TokenIssuer` owns the process-wide signing key. It is built once from
/// `JwtSettings` at startup and shared behind an `Arc`; the key never
/// changes for the lifetime of the process.

use std::fmt;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::domain::Role;
use crate::error::{AppError, AuthError, DependencyError};

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: Duration::seconds(config.token_ttl_seconds),
        }
    }

    /// Session lifetime applied at login
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a new token for `user_id` valid for `ttl` from now
    ///
    /// # Errors
    /// Returns `DependencyError::Signing` if encoding fails
    pub fn issue(&self, user_id: Uuid, role: Role, ttl: Duration) -> Result<IssuedToken, AppError> {
        let claims = Claims::new(user_id, role, ttl, &self.issuer);

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DependencyError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, issuer and expiry (no leeway)
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode(token, true)
    }

    /// Verify signature and issuer but accept tokens past their expiry.
    /// Used where only authenticity matters, such as logout.
    pub fn parse_allow_expired(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode(token, false)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
                    _ => AuthError::MalformedToken,
                };
                tracing::debug!(error = %e, "JWT rejected");
                err
            })
    }
}
