//! Authentication and session management.
//!
//! Provides password hashing, the identity store, the JWT codec, the
//! in-memory session registry and the service that ties them together.

pub mod guard;
pub mod identities;
pub mod jwt;
pub mod password;
pub mod service;
pub mod sessions;

use thiserror::Error;

pub use guard::authenticate;
pub use identities::{IdentityStore, StaticIdentityStore};
pub use jwt::TokenCodec;
pub use service::SessionService;
pub use sessions::SessionRegistry;

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Unified login failure (unknown user or wrong password).
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unknown identity")]
    UnknownIdentity,

    #[error("Bad password")]
    BadPassword,

    #[error("Identity already exists")]
    IdentityExists,

    #[error("Missing token")]
    MissingToken,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Expired token")]
    ExpiredToken,

    #[error("Bad token signature")]
    BadSignature,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this error means "the caller is not authenticated", as opposed
    /// to a server-side fault or an administrative conflict.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::UnknownIdentity
                | AuthError::BadPassword
                | AuthError::MissingToken
                | AuthError::MalformedToken
                | AuthError::ExpiredToken
                | AuthError::BadSignature
                | AuthError::SessionNotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_session_errors_are_unauthorized() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::MissingToken,
            AuthError::MalformedToken,
            AuthError::ExpiredToken,
            AuthError::BadSignature,
            AuthError::SessionNotFound,
        ] {
            assert!(err.is_unauthorized(), "{err:?}");
        }
    }

    #[test]
    fn internal_is_not_unauthorized() {
        assert!(!AuthError::Internal("lock poisoned".into()).is_unauthorized());
        assert!(!AuthError::IdentityExists.is_unauthorized());
    }
}
