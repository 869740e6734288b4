//! Authentication domain models.
//!
//! Claims live only inside signed tokens; `Session` is the only record kept
//! server-side, and it never carries a usable credential.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Authenticated identity (the username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token family marker embedded in every token as the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFamily {
    Access,
    Refresh,
}

impl fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenFamily::Access => f.write_str("access"),
            TokenFamily::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: username.
    pub sub: String,
    pub typ: TokenFamily,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject: username.
    pub sub: String,
    /// Random token id (64 hex chars), unique per issuance.
    pub jti: String,
    pub typ: TokenFamily,
    pub iat: i64,
    pub exp: i64,
}

/// Claims common to both token families.
pub trait ExpiringClaims {
    fn family(&self) -> TokenFamily;
    fn expires_at(&self) -> i64;
}

impl ExpiringClaims for AccessClaims {
    fn family(&self) -> TokenFamily {
        self.typ
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl ExpiringClaims for RefreshClaims {
    fn family(&self) -> TokenFamily {
        self.typ
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Registry key: SHA-256 fingerprint of a refresh token's id.
///
/// One-way, so registry contents cannot be turned back into a token id,
/// let alone a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Fingerprint a refresh token id.
    pub fn from_token_id(token_id: &str) -> Self {
        Self(hex::encode(Sha256::digest(token_id.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix: enough to correlate log lines.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Client metadata recorded with a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
}

impl ClientMeta {
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Server-side record of one live refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub key: SessionKey,
    /// When this refresh token was issued; drives sweep eviction.
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Creation time of the first session in this rotation chain.
    pub session_started_at: DateTime<Utc>,
    pub client: ClientMeta,
}

impl Session {
    /// Age of this refresh token at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub identity: Identity,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}
