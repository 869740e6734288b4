//! Session service: login, refresh (rotation) and logout flows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::guard;
use super::identities::{IdentityStore, StaticIdentityStore};
use super::jwt::TokenCodec;
use super::sessions::SessionRegistry;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::models::auth::{ClientMeta, Identity, Session, SessionKey, TokenPair};

/// Orchestrates the identity store, token codec and session registry.
pub struct SessionService {
    identities: Arc<dyn IdentityStore>,
    codec: TokenCodec,
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        codec: TokenCodec,
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            codec,
            registry,
            clock,
        }
    }

    /// Wire a service from validated configuration: the admin identity is
    /// hashed into a [`StaticIdentityStore`] and a fresh registry is created.
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let identities = StaticIdentityStore::with_admin(
            &config.admin_username,
            &config.admin_password,
            config.bcrypt_cost,
        )?;
        let codec = TokenCodec::new(
            config.access_secret.as_bytes(),
            config.refresh_secret.as_bytes(),
            config.access_ttl,
            config.refresh_ttl,
        );
        Ok(Self::new(
            Arc::new(identities),
            codec,
            Arc::new(SessionRegistry::new()),
            clock,
        ))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn access_ttl(&self) -> Duration {
        self.codec.access_ttl()
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.codec.refresh_ttl()
    }

    /// Authenticate with username + password and open a session.
    ///
    /// Unknown usernames and wrong passwords both fail with
    /// `InvalidCredentials`. Runs a bcrypt comparison; keep it off async
    /// worker threads.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        client: ClientMeta,
    ) -> Result<TokenPair, AuthError> {
        match self.identities.verify(username, password) {
            Ok(()) => {}
            Err(e @ (AuthError::UnknownIdentity | AuthError::BadPassword)) => {
                debug!(username, reason = %e, "login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        }

        let identity = Identity::new(username);
        let now = self.clock.now();
        let (pair, key) = self.issue_pair(&identity, now)?;
        let session = self.registry.create(identity, key, client, now)?;
        info!(username, session = %session.key, "login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, invalidating the old token.
    ///
    /// The registry is consulted first: a token whose session is gone
    /// (rotated, revoked, swept, never issued) fails even if its signature
    /// still verifies. A token that has a session but fails verification
    /// revokes that session.
    pub fn refresh(&self, refresh_token: &str, client: ClientMeta) -> Result<TokenPair, AuthError> {
        let token_id = self.codec.peek_refresh_id(refresh_token)?;
        let key = SessionKey::from_token_id(&token_id);
        let session = self.registry.lookup(&key)?;

        let now = self.clock.now();
        let claims = match self.codec.verify_refresh(refresh_token, now) {
            Ok(claims) => claims,
            Err(e) => {
                self.registry.revoke(&key)?;
                warn!(session = %key, reason = %e, "refresh token failed verification, session revoked");
                return Err(e);
            }
        };
        if claims.sub != session.identity.as_str() {
            self.registry.revoke(&key)?;
            warn!(session = %key, "refresh token subject does not match session, session revoked");
            return Err(AuthError::MalformedToken);
        }

        let (pair, next_key) = self.issue_pair(&session.identity, now)?;
        let next = Session {
            identity: session.identity.clone(),
            key: next_key,
            created_at: now,
            last_used_at: now,
            session_started_at: session.session_started_at,
            client,
        };
        let next = self.registry.rotate(&key, next)?;
        debug!(username = %next.identity, old = %key, new = %next.key, "session rotated");
        Ok(pair)
    }

    /// Revoke the session behind `refresh_token`. Best effort: malformed or
    /// unknown tokens are not errors. Returns whether a session was removed.
    pub fn logout(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let token_id = match self.codec.peek_refresh_id(refresh_token) {
            Ok(id) => id,
            Err(_) => return Ok(false),
        };
        let key = SessionKey::from_token_id(&token_id);
        let removed = self.registry.revoke(&key)?;
        if removed {
            info!(session = %key, "logged out");
        }
        Ok(removed)
    }

    /// Revoke every session of `identity` ("log out everywhere").
    pub fn revoke_all_for(&self, identity: &Identity) -> Result<usize, AuthError> {
        let removed = self.registry.revoke_all_for(identity)?;
        info!(username = %identity, removed, "revoked all sessions");
        Ok(removed)
    }

    /// Resolve the caller behind an access token.
    pub fn authenticate(&self, access_token: Option<&str>) -> Result<Identity, AuthError> {
        guard::authenticate(&self.codec, access_token, self.clock.now())
    }

    pub fn active_sessions(&self) -> Result<usize, AuthError> {
        self.registry.count()
    }

    fn issue_pair(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, SessionKey), AuthError> {
        let (access_token, access_expires_at) = self.codec.issue_access(identity, now)?;
        let refresh = self.codec.issue_refresh(identity, now)?;
        let key = SessionKey::from_token_id(&refresh.token_id);
        let pair = TokenPair {
            identity: identity.clone(),
            access_token,
            access_expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        };
        Ok((pair, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::auth::{RefreshClaims, TokenFamily};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const T0: i64 = 1_700_000_000;

    struct Harness {
        service: SessionService,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let identities = StaticIdentityStore::with_admin("admin", "correct-pw", 4).unwrap();
        identities.add("ops", "ops-password").unwrap();
        let clock = Arc::new(ManualClock::at_unix(T0));
        let codec = TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(5),
            Duration::days(7),
        );
        let service = SessionService::new(
            Arc::new(identities),
            codec,
            Arc::new(SessionRegistry::new()),
            clock.clone(),
        );
        Harness { service, clock }
    }

    fn meta() -> ClientMeta {
        ClientMeta::with_user_agent("test-agent")
    }

    #[test]
    fn login_returns_two_independent_tokens() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(pair.identity, Identity::new("admin"));

        assert_eq!(
            h.service.authenticate(Some(&pair.access_token)),
            Ok(Identity::new("admin"))
        );
        // The refresh token is not an access token.
        assert!(h.service.authenticate(Some(&pair.refresh_token)).is_err());
        assert_eq!(h.service.active_sessions().unwrap(), 1);
    }

    #[test]
    fn login_failure_is_uniform() {
        let h = harness();
        let wrong_password = h.service.login("admin", "nope", meta()).unwrap_err();
        let unknown_user = h.service.login("ghost", "correct-pw", meta()).unwrap_err();
        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(unknown_user, AuthError::InvalidCredentials);
        assert_eq!(h.service.active_sessions().unwrap(), 0);
    }

    #[test]
    fn refresh_rotates_and_old_token_is_dead() {
        let h = harness();
        let first = h.service.login("admin", "correct-pw", meta()).unwrap();
        h.clock.advance(Duration::minutes(1));

        let second = h.service.refresh(&first.refresh_token, meta()).unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(h.service.active_sessions().unwrap(), 1);

        // Signature and expiry of the old token are still fine, but it is consumed.
        assert_eq!(
            h.service.refresh(&first.refresh_token, meta()).unwrap_err(),
            AuthError::SessionNotFound
        );
        // The new token keeps working.
        assert!(h.service.refresh(&second.refresh_token, meta()).is_ok());
    }

    #[test]
    fn rotation_carries_session_start_forward() {
        let h = harness();
        let first = h.service.login("admin", "correct-pw", meta()).unwrap();
        h.clock.advance(Duration::hours(1));
        let second = h
            .service
            .refresh(&first.refresh_token, ClientMeta::with_user_agent("new-agent"))
            .unwrap();

        let token_id = h.service.codec.peek_refresh_id(&second.refresh_token).unwrap();
        let session = h
            .service
            .registry()
            .lookup(&SessionKey::from_token_id(&token_id))
            .unwrap();
        assert_eq!(session.created_at, h.clock.now());
        assert_eq!(session.session_started_at, DateTime::from_timestamp(T0, 0).unwrap());
        assert_eq!(session.client.user_agent.as_deref(), Some("new-agent"));
    }

    #[test]
    fn revoke_all_for_kills_every_refresh_token() {
        let h = harness();
        let a = h.service.login("admin", "correct-pw", meta()).unwrap();
        let b = h.service.login("admin", "correct-pw", meta()).unwrap();
        let other = h.service.login("ops", "ops-password", meta()).unwrap();

        assert_eq!(h.service.revoke_all_for(&Identity::new("admin")).unwrap(), 2);
        for token in [&a.refresh_token, &b.refresh_token] {
            assert_eq!(
                h.service.refresh(token, meta()).unwrap_err(),
                AuthError::SessionNotFound
            );
        }
        assert!(h.service.refresh(&other.refresh_token, meta()).is_ok());
    }

    #[test]
    fn expired_refresh_token_fails_and_revokes_session() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        h.clock.advance(Duration::days(7));

        assert_eq!(
            h.service.refresh(&pair.refresh_token, meta()).unwrap_err(),
            AuthError::ExpiredToken
        );
        assert_eq!(h.service.active_sessions().unwrap(), 0);
    }

    #[test]
    fn forged_refresh_token_revokes_the_session() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        let token_id = h.service.codec.peek_refresh_id(&pair.refresh_token).unwrap();

        let forged = encode(
            &Header::default(),
            &RefreshClaims {
                sub: "admin".into(),
                jti: token_id,
                typ: TokenFamily::Refresh,
                iat: T0,
                exp: T0 + 3600,
            },
            &EncodingKey::from_secret(b"guessed-secret"),
        )
        .unwrap();

        assert_eq!(
            h.service.refresh(&forged, meta()).unwrap_err(),
            AuthError::BadSignature
        );
        // The genuine token is now dead as well.
        assert_eq!(
            h.service.refresh(&pair.refresh_token, meta()).unwrap_err(),
            AuthError::SessionNotFound
        );
    }

    #[test]
    fn access_token_cannot_refresh() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        assert_eq!(
            h.service.refresh(&pair.access_token, meta()).unwrap_err(),
            AuthError::MalformedToken
        );
        assert_eq!(h.service.active_sessions().unwrap(), 1);
    }

    #[test]
    fn logout_is_best_effort() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        assert!(h.service.logout(&pair.refresh_token).unwrap());
        assert!(!h.service.logout(&pair.refresh_token).unwrap());
        assert!(!h.service.logout("garbage").unwrap());
        assert_eq!(
            h.service.refresh(&pair.refresh_token, meta()).unwrap_err(),
            AuthError::SessionNotFound
        );
    }

    #[test]
    fn access_token_expires_at_boundary() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        h.clock.advance(Duration::seconds(299));
        assert!(h.service.authenticate(Some(&pair.access_token)).is_ok());
        h.clock.advance(Duration::seconds(1));
        assert_eq!(
            h.service.authenticate(Some(&pair.access_token)),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn concurrent_logins_all_register() {
        const USERS: usize = 16;
        let identities = StaticIdentityStore::with_cost(4).unwrap();
        for n in 0..USERS {
            identities
                .add(&format!("user-{n}"), &format!("password-{n}"))
                .unwrap();
        }
        let service = Arc::new(SessionService::new(
            Arc::new(identities),
            TokenCodec::new(b"a", b"r", Duration::minutes(5), Duration::days(7)),
            Arc::new(SessionRegistry::new()),
            Arc::new(ManualClock::at_unix(T0)),
        ));

        let handles: Vec<_> = (0..USERS)
            .map(|n| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    service
                        .login(&format!("user-{n}"), &format!("password-{n}"), meta())
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(service.active_sessions().unwrap(), USERS);
    }

    #[test]
    fn concurrent_refresh_of_one_token_succeeds_once() {
        let h = harness();
        let pair = h.service.login("admin", "correct-pw", meta()).unwrap();
        let service = Arc::new(h.service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let token = pair.refresh_token.clone();
                std::thread::spawn(move || service.refresh(&token, meta()).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(service.active_sessions().unwrap(), 1);
    }
}
