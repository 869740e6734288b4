//! Identity store: username → bcrypt hash.
//!
//! The session service only sees the [`IdentityStore`] trait, so a
//! database-backed store can replace the static one without touching it.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use super::AuthError;
use super::password::{DEFAULT_BCRYPT_COST, hash_password, verify_password};

/// Identity lookup capability consumed by the session service.
pub trait IdentityStore: Send + Sync {
    /// Check a username/password pair.
    ///
    /// Fails with `UnknownIdentity` or `BadPassword`; callers must collapse
    /// both into one external outcome.
    fn verify(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Register a new identity. Administrative; never exposed to
    /// unauthenticated callers.
    fn add(&self, username: &str, password: &str) -> Result<(), AuthError>;

    fn contains(&self, username: &str) -> bool;

    fn count(&self) -> usize;
}

/// In-memory identity store seeded from configuration at startup.
pub struct StaticIdentityStore {
    users: RwLock<HashMap<String, String>>,
    cost: u32,
    /// Hash verified against for unknown usernames so both failure paths
    /// cost one bcrypt comparison.
    dummy_hash: String,
}

impl StaticIdentityStore {
    /// Create an empty store hashing at the default cost.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_cost(DEFAULT_BCRYPT_COST)
    }

    pub fn with_cost(cost: u32) -> Result<Self, AuthError> {
        Ok(Self {
            users: RwLock::new(HashMap::new()),
            cost,
            dummy_hash: hash_password("dummy-password-for-timing", cost)?,
        })
    }

    /// Build a store holding a single administrator.
    pub fn with_admin(username: &str, password: &str, cost: u32) -> Result<Self, AuthError> {
        let store = Self::with_cost(cost)?;
        store.add(username, password)?;
        info!(username, "admin user initialized");
        Ok(store)
    }
}

impl IdentityStore for StaticIdentityStore {
    fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let stored = self
            .users
            .read()
            .map_err(|_| AuthError::Internal("identity store lock poisoned".into()))?
            .get(username)
            .cloned();

        match stored {
            Some(hash) => {
                if verify_password(password, &hash)? {
                    Ok(())
                } else {
                    Err(AuthError::BadPassword)
                }
            }
            None => {
                let _ = verify_password(password, &self.dummy_hash);
                Err(AuthError::UnknownIdentity)
            }
        }
    }

    fn add(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if self.contains(username) {
            return Err(AuthError::IdentityExists);
        }
        // Hash outside the lock; re-check on insert.
        let hash = hash_password(password, self.cost)?;
        let mut users = self
            .users
            .write()
            .map_err(|_| AuthError::Internal("identity store lock poisoned".into()))?;
        if users.contains_key(username) {
            return Err(AuthError::IdentityExists);
        }
        users.insert(username.to_string(), hash);
        Ok(())
    }

    fn contains(&self, username: &str) -> bool {
        self.users
            .read()
            .map(|users| users.contains_key(username))
            .unwrap_or(false)
    }

    fn count(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StaticIdentityStore {
        StaticIdentityStore::with_admin("admin", "correct-pw", 4).unwrap()
    }

    #[test]
    fn verify_accepts_correct_password() {
        assert_eq!(store().verify("admin", "correct-pw"), Ok(()));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        assert_eq!(
            store().verify("admin", "wrong-pw"),
            Err(AuthError::BadPassword)
        );
    }

    #[test]
    fn verify_rejects_unknown_user() {
        assert_eq!(
            store().verify("nobody", "correct-pw"),
            Err(AuthError::UnknownIdentity)
        );
    }

    #[test]
    fn add_rejects_duplicates() {
        let store = store();
        assert_eq!(store.add("admin", "other-pw"), Err(AuthError::IdentityExists));
        // Original password still valid.
        assert_eq!(store.verify("admin", "correct-pw"), Ok(()));
    }

    #[test]
    fn add_registers_new_identity() {
        let store = store();
        store.add("ops", "ops-password").unwrap();
        assert!(store.contains("ops"));
        assert_eq!(store.count(), 2);
        assert_eq!(store.verify("ops", "ops-password"), Ok(()));
    }
}
