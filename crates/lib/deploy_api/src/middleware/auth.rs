//! Authentication middleware: access-token extraction and verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use deploy_core::models::auth::Identity;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::auth::authenticate;
use crate::services::cookies::ACCESS_COOKIE;

/// Identity stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

/// Axum middleware: reads the access token from the `access_token` cookie
/// (or an `Authorization: Bearer <token>` header), verifies it and injects
/// [`AuthenticatedUser`] into the request extensions.
///
/// Every failure yields the same 401; the reason is only logged.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or(bearer);

    let identity = authenticate(&state, token.as_deref()).map_err(|e| {
        debug!(reason = %e, path = %request.uri().path(), "access token rejected");
        if e.is_unauthorized() {
            AppError::unauthorized()
        } else {
            AppError::from(e)
        }
    })?;

    request.extensions_mut().insert(AuthenticatedUser(identity));

    Ok(next.run(request).await)
}
