//! JWT token generation and verification.
//!
//! Access and refresh tokens are signed (HS256) with distinct secrets and carry
//! a `typ` claim naming their family. A token of one family never verifies as
//! the other. Expiry is checked against the caller-supplied `now` with strict
//! inequality: a token is valid iff `now < exp`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::AuthError;
use crate::models::auth::{AccessClaims, ExpiringClaims, Identity, RefreshClaims, TokenFamily};

/// Refresh token id entropy: 256 bits.
const TOKEN_ID_BYTES: usize = 32;

/// A freshly signed refresh token.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    /// Random id embedded as `jti`; the session registry keys on its digest.
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

struct FamilyKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl FamilyKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Stateless signer/verifier for both token families.
pub struct TokenCodec {
    access: FamilyKeys,
    refresh: FamilyKeys,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl", &self.access.ttl)
            .field("refresh_ttl", &self.refresh.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: FamilyKeys::new(access_secret, access_ttl),
            refresh: FamilyKeys::new(refresh_secret, refresh_ttl),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    /// Sign an access token for `identity`, expiring `access_ttl` after `now`.
    pub fn issue_access(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let iat = now.timestamp();
        let exp = iat + self.access.ttl.num_seconds();
        let claims = AccessClaims {
            sub: identity.as_str().to_string(),
            typ: TokenFamily::Access,
            iat,
            exp,
        };
        let token = sign(&claims, &self.access.encoding)?;
        Ok((token, to_datetime(exp)?))
    }

    /// Sign a refresh token for `identity` with a fresh random token id.
    pub fn issue_refresh(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefresh, AuthError> {
        let iat = now.timestamp();
        let exp = iat + self.refresh.ttl.num_seconds();
        let token_id = generate_token_id();
        let claims = RefreshClaims {
            sub: identity.as_str().to_string(),
            jti: token_id.clone(),
            typ: TokenFamily::Refresh,
            iat,
            exp,
        };
        let token = sign(&claims, &self.refresh.encoding)?;
        Ok(IssuedRefresh {
            token,
            token_id,
            expires_at: to_datetime(exp)?,
        })
    }

    /// Verify signature, family and expiry of `token`.
    pub fn verify<C>(
        &self,
        token: &str,
        family: TokenFamily,
        now: DateTime<Utc>,
    ) -> Result<C, AuthError>
    where
        C: DeserializeOwned + ExpiringClaims,
    {
        let keys = match family {
            TokenFamily::Access => &self.access,
            TokenFamily::Refresh => &self.refresh,
        };
        let claims = decode::<C>(token, &keys.decoding, &validation())
            .map_err(map_jwt_error)?
            .claims;

        if claims.family() != family {
            debug!(expected = %family, actual = %claims.family(), "token family mismatch");
            return Err(AuthError::MalformedToken);
        }
        if now.timestamp() >= claims.expires_at() {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, AuthError> {
        self.verify(token, TokenFamily::Access, now)
    }

    pub fn verify_refresh(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims, AuthError> {
        self.verify(token, TokenFamily::Refresh, now)
    }

    /// Read the token id of a refresh token without checking its signature
    /// or expiry. The result is only fit for computing a registry key; the
    /// token must still pass [`TokenCodec::verify_refresh`].
    pub fn peek_refresh_id(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        let claims = decode::<RefreshClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::MalformedToken)?
            .claims;
        if claims.typ != TokenFamily::Refresh || claims.jti.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        Ok(claims.jti)
    }
}

/// Expiry is checked by hand against the injected clock, so the library's
/// own clock-based check stays off.
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation
}

fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::MalformedToken,
    }
}

fn to_datetime(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Internal(format!("timestamp out of range: {secs}")))
}

/// 256 random bits, hex-encoded.
fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
