//! Transport-independent half of the request guard.

use chrono::{DateTime, Utc};

use super::AuthError;
use super::jwt::TokenCodec;
use crate::models::auth::Identity;

/// Resolve the identity behind an access token, if any was presented.
///
/// Errors keep their precise kind for logging; the HTTP layer collapses all
/// of them into one unauthorized response.
pub fn authenticate(
    codec: &TokenCodec,
    access_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Identity, AuthError> {
    let token = access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let claims = codec.verify_access(token, now)?;
    Ok(Identity(claims.sub))
}
