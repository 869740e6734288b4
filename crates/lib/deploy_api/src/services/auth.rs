//! Authentication service: async bridge to `deploy_core::auth::SessionService`.
//!
//! Login verifies a bcrypt hash, so it runs on the blocking pool. Refresh,
//! logout and guard checks are HMAC-only and stay on the async worker.

use std::sync::Arc;

use deploy_core::auth::AuthError;
use deploy_core::models::auth::{ClientMeta, Identity, TokenPair};

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Authenticate with username + password.
pub async fn login(
    state: &AppState,
    username: String,
    password: String,
    client: ClientMeta,
) -> AppResult<TokenPair> {
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.login(&username, &password, client))
        .await
        .map_err(|e| AppError::Internal(format!("login task: {e}")))?
        .map_err(AppError::from)
}

/// Rotate a refresh token into a new pair.
pub fn refresh(state: &AppState, refresh_token: &str, client: ClientMeta) -> AppResult<TokenPair> {
    state
        .service
        .refresh(refresh_token, client)
        .map_err(AppError::from)
}

/// Revoke the session behind an optional refresh token.
pub fn logout(state: &AppState, refresh_token: Option<&str>) -> AppResult<bool> {
    match refresh_token {
        Some(token) => state.service.logout(token).map_err(AppError::from),
        None => Ok(false),
    }
}

/// Revoke every session of `identity`.
pub fn logout_all(state: &AppState, identity: &Identity) -> AppResult<usize> {
    state
        .service
        .revoke_all_for(identity)
        .map_err(AppError::from)
}

/// Resolve the caller behind an access token. Token failures keep their
/// specific kind here so the middleware can log them.
pub fn authenticate(state: &AppState, access_token: Option<&str>) -> Result<Identity, AuthError> {
    state.service.authenticate(access_token)
}

/// Number of live sessions.
pub fn active_sessions(state: &AppState) -> AppResult<usize> {
    state.service.active_sessions().map_err(AppError::from)
}
