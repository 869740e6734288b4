//! Config value parsing and cross-field validation.

use chrono::Duration;

use super::{AuthConfig, ConfigError};

/// Minimum admin password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt's accepted cost range.
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Nanoseconds per unit. `d` is accepted on top of Go's units.
const UNITS: &[(&str, i128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 86_400 * 1_000_000_000),
];

/// Parse a Go-style duration such as `90s`, `1.5h`, `500ms` or `1h30m`.
///
/// Follows Go's `time.ParseDuration`: an optional sign, then one or more
/// decimal numbers (fractions allowed), each with a unit out of `ns`, `us`,
/// `ms`, `s`, `m`, `h`. Two extensions: a `d` (24h) unit, and a bare
/// integer read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Duration::try_seconds(secs).ok_or_else(|| format!("duration out of range: {raw:?}"));
    }

    let (negative, mut rest) = match raw.as_bytes()[0] {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(format!("invalid duration {raw:?}"));
    }

    let out_of_range = || format!("duration out of range: {raw:?}");
    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("expected a number in {raw:?}"));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(format!("missing unit in {raw:?}"));
        }
        let scale = UNITS
            .iter()
            .find_map(|&(name, nanos)| (name == unit).then_some(nanos))
            .ok_or_else(|| format!("unknown unit {unit:?} in {raw:?}"))?;

        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| out_of_range())?
        };
        let mut part = whole.checked_mul(scale).ok_or_else(out_of_range)?;
        // Digits past nanosecond precision cannot contribute.
        let mut place = scale;
        for digit in frac_part.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            part += i128::from(digit - b'0') * place;
        }
        total = total.checked_add(part).ok_or_else(out_of_range)?;
        rest = tail;
    }

    let nanos = i64::try_from(if negative { -total } else { total }).map_err(|_| out_of_range())?;
    Ok(Duration::nanoseconds(nanos))
}

/// Startup checks: lifetimes positive and ordered, secrets distinct,
/// admin password long enough, bcrypt cost in range.
pub fn validate(config: &AuthConfig) -> Result<(), ConfigError> {
    if config.access_ttl < Duration::seconds(1) {
        return Err(ConfigError::Invalid {
            var: "ACCESS_TOKEN_DURATION",
            reason: "must be at least 1s".into(),
        });
    }
    if config.refresh_ttl < Duration::seconds(1) {
        return Err(ConfigError::Invalid {
            var: "REFRESH_TOKEN_DURATION",
            reason: "must be at least 1s".into(),
        });
    }
    if config.access_ttl >= config.refresh_ttl {
        return Err(ConfigError::DurationOrder {
            access: config.access_ttl.num_seconds(),
            refresh: config.refresh_ttl.num_seconds(),
        });
    }
    if config.access_secret == config.refresh_secret {
        return Err(ConfigError::SameSecrets);
    }
    if config.admin_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ConfigError::Invalid {
            var: "ADMIN_PASSWORD",
            reason: format!("must be at least {MIN_PASSWORD_LEN} characters long"),
        });
    }
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&config.bcrypt_cost) {
        return Err(ConfigError::Invalid {
            var: "BCRYPT_COST",
            reason: format!("must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}"),
        });
    }
    if config.sweep_interval.is_zero() {
        return Err(ConfigError::Invalid {
            var: "SESSION_SWEEP_INTERVAL",
            reason: "must be positive".into(),
        });
    }
    Ok(())
}
