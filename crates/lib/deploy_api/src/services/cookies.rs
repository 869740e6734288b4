//! Cookie service: set/clear httpOnly auth cookies.
//!
//! The access cookie is sent on every path; the refresh cookie is scoped to
//! the refresh endpoint so it only travels when it is needed.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::routes::POST_AUTH_REFRESH;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

const ACCESS_COOKIE_PATH: &str = "/";

fn auth_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path)
        .max_age(max_age)
        .build()
}

/// Build the access-token cookie.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        ACCESS_COOKIE_PATH,
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Build the refresh-token cookie, scoped to the refresh endpoint.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        POST_AUTH_REFRESH,
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Build expired cookie to clear the access token.
pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    auth_cookie(ACCESS_COOKIE, String::new(), ACCESS_COOKIE_PATH, Duration::ZERO, secure)
}

/// Build expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    auth_cookie(REFRESH_COOKIE, String::new(), POST_AUTH_REFRESH, Duration::ZERO, secure)
}

/// Add both expired cookies to `jar`.
pub fn clear_auth_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(clear_access_cookie(secure))
        .add(clear_refresh_cookie(secure))
}
