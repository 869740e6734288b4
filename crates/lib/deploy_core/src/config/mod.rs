//! Authentication configuration: environment loading and startup validation.

pub mod validation;

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use crate::auth::password::DEFAULT_BCRYPT_COST;
use validation::parse_duration;

/// Default access-token lifetime.
pub const DEFAULT_ACCESS_DURATION: &str = "5m";
/// Default refresh-token lifetime (7 days).
pub const DEFAULT_REFRESH_DURATION: &str = "168h";
/// Default interval between session sweeps.
pub const DEFAULT_SWEEP_INTERVAL: &str = "1h";

/// Startup configuration errors. Any of these aborts the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error(
        "access token duration ({access}s) must be shorter than refresh token duration ({refresh}s)"
    )]
    DurationOrder { access: i64, refresh: i64 },

    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SameSecrets,
}

/// Validated authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub admin_username: String,
    pub admin_password: String,
    /// Production deployments only send credentials over TLS.
    pub production: bool,
    pub sweep_interval: StdDuration,
    pub bcrypt_cost: u32,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("admin_username", &self.admin_username)
            .field("production", &self.production)
            .field("sweep_interval", &self.sweep_interval)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                  | Default  |
    /// |---------------------------|----------|
    /// | `JWT_ACCESS_SECRET`       | required |
    /// | `JWT_REFRESH_SECRET`      | required |
    /// | `ACCESS_TOKEN_DURATION`   | `5m`     |
    /// | `REFRESH_TOKEN_DURATION`  | `168h`   |
    /// | `ADMIN_USERNAME`          | required |
    /// | `ADMIN_PASSWORD`          | required |
    /// | `ENVIRONMENT`             | unset    |
    /// | `SESSION_SWEEP_INTERVAL`  | `1h`     |
    /// | `BCRYPT_COST`             | `10`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, then validate.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            get(var)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let duration = |var: &'static str, default: &str| {
            let raw = get(var)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string());
            parse_duration(&raw).map_err(|reason| ConfigError::Invalid { var, reason })
        };

        let sweep_interval = duration("SESSION_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL)?
            .to_std()
            .map_err(|e| ConfigError::Invalid {
                var: "SESSION_SWEEP_INTERVAL",
                reason: e.to_string(),
            })?;

        let bcrypt_cost = match get("BCRYPT_COST").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                var: "BCRYPT_COST",
                reason: e.to_string(),
            })?,
            None => DEFAULT_BCRYPT_COST,
        };

        let config = Self {
            access_secret: required("JWT_ACCESS_SECRET")?,
            refresh_secret: required("JWT_REFRESH_SECRET")?,
            access_ttl: duration("ACCESS_TOKEN_DURATION", DEFAULT_ACCESS_DURATION)?,
            refresh_ttl: duration("REFRESH_TOKEN_DURATION", DEFAULT_REFRESH_DURATION)?,
            admin_username: required("ADMIN_USERNAME")?,
            admin_password: required("ADMIN_PASSWORD")?,
            production: get("ENVIRONMENT").as_deref() == Some("production"),
            sweep_interval,
            bcrypt_cost,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("JWT_ACCESS_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD", "correct-pw"),
        ]
    }

    #[test]
    fn defaults_apply() {
        let config = AuthConfig::from_lookup(env(&base())).unwrap();
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert_eq!(config.sweep_interval, StdDuration::from_secs(3600));
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert!(!config.production);
    }

    #[test]
    fn missing_secret_is_fatal() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != "JWT_REFRESH_SECRET")
            .collect();
        assert_eq!(
            AuthConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Missing("JWT_REFRESH_SECRET")
        );
    }

    #[test]
    fn missing_admin_is_fatal() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != "ADMIN_USERNAME")
            .collect();
        assert_eq!(
            AuthConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Missing("ADMIN_USERNAME")
        );
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let pairs: Vec<_> = base()
            .into_iter()
            .map(|(k, v)| if k == "ADMIN_PASSWORD" { (k, "") } else { (k, v) })
            .collect();
        assert_eq!(
            AuthConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Missing("ADMIN_PASSWORD")
        );
    }

    #[test]
    fn access_must_be_shorter_than_refresh() {
        let mut pairs = base();
        pairs.push(("ACCESS_TOKEN_DURATION", "2h"));
        pairs.push(("REFRESH_TOKEN_DURATION", "1h"));
        assert_eq!(
            AuthConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::DurationOrder {
                access: 7200,
                refresh: 3600
            }
        );

        let mut equal = base();
        equal.push(("ACCESS_TOKEN_DURATION", "1h"));
        equal.push(("REFRESH_TOKEN_DURATION", "60m"));
        assert!(matches!(
            AuthConfig::from_lookup(env(&equal)).unwrap_err(),
            ConfigError::DurationOrder { .. }
        ));
    }

    #[test]
    fn unparseable_duration_names_the_variable() {
        let mut pairs = base();
        pairs.push(("ACCESS_TOKEN_DURATION", "five minutes"));
        assert!(matches!(
            AuthConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Invalid {
                var: "ACCESS_TOKEN_DURATION",
                ..
            }
        ));
    }

    #[test]
    fn production_flag_and_overrides() {
        let mut pairs = base();
        pairs.push(("ENVIRONMENT", "production"));
        pairs.push(("BCRYPT_COST", "6"));
        pairs.push(("SESSION_SWEEP_INTERVAL", "10m"));
        let config = AuthConfig::from_lookup(env(&pairs)).unwrap();
        assert!(config.production);
        assert_eq!(config.bcrypt_cost, 6);
        assert_eq!(config.sweep_interval, StdDuration::from_secs(600));
    }

    #[test]
    fn fractional_and_sub_second_durations_load() {
        let mut pairs = base();
        pairs.push(("ACCESS_TOKEN_DURATION", "1.5h"));
        pairs.push(("REFRESH_TOKEN_DURATION", "2h"));
        pairs.push(("SESSION_SWEEP_INTERVAL", "500ms"));
        let config = AuthConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.access_ttl, Duration::minutes(90));
        assert_eq!(config.refresh_ttl, Duration::hours(2));
        assert_eq!(config.sweep_interval, StdDuration::from_millis(500));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = AuthConfig::from_lookup(env(&base())).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("correct-pw"));
        assert!(!printed.contains("access_secret"));
    }
}
