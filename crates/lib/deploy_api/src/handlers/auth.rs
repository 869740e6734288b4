//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum_extra::extract::cookie::CookieJar;
use deploy_core::models::auth::{ClientMeta, TokenPair};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    LoginRequest, LoginResponse, LogoutAllResponse, LogoutRequest, MeResponse, MessageResponse,
    RefreshResponse, SessionCountResponse,
};
use crate::services::auth;
use crate::services::cookies::{
    REFRESH_COOKIE, access_cookie, clear_auth_cookies, refresh_cookie,
};

fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Put both tokens of `pair` into the jar.
fn set_auth_cookies(state: &AppState, jar: CookieJar, pair: &TokenPair) -> CookieJar {
    let secure = state.config.secure_cookies;
    jar.add(access_cookie(
        &pair.access_token,
        state.service.access_ttl().num_seconds(),
        secure,
    ))
    .add(refresh_cookie(
        &pair.refresh_token,
        state.service.refresh_ttl().num_seconds(),
        secure,
    ))
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let pair = auth::login(&state, body.username, body.password, client_meta(&headers)).await?;
    let jar = set_auth_cookies(&state, jar, &pair);
    Ok((
        jar,
        Json(LoginResponse {
            authenticated: true,
            username: pair.identity.0,
        }),
    ))
}

/// `POST /auth/refresh`: rotate the refresh cookie into a new token pair.
///
/// Any authentication failure clears both cookies.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), (CookieJar, AppError)> {
    let secure = state.config.secure_cookies;
    let Some(token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) else {
        return Err((clear_auth_cookies(jar, secure), AppError::unauthorized()));
    };

    match auth::refresh(&state, &token, client_meta(&headers)) {
        Ok(pair) => {
            let jar = set_auth_cookies(&state, jar, &pair);
            Ok((
                jar,
                Json(RefreshResponse {
                    message: "Token refreshed successfully".into(),
                    expires_in: state.service.access_ttl().num_seconds(),
                }),
            ))
        }
        Err(e) if e.is_unauthorized() => Err((clear_auth_cookies(jar, secure), e)),
        Err(e) => Err((jar, e)),
    }
}

/// `POST /auth/logout`: revoke the presented refresh token (cookie or JSON
/// body) and clear both cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let from_body = serde_json::from_slice::<LogoutRequest>(&body)
        .ok()
        .and_then(|b| b.refresh_token);
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(from_body);

    auth::logout(&state, token.as_deref())?;

    Ok((
        clear_auth_cookies(jar, state.config.secure_cookies),
        Json(MessageResponse {
            message: "Logged out successfully".into(),
        }),
    ))
}

/// `POST /auth/logout-all`: revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutAllResponse>)> {
    let revoked = auth::logout_all(&state, &identity)?;
    info!(username = %identity, revoked, "logged out everywhere");
    Ok((
        clear_auth_cookies(jar, state.config.secure_cookies),
        Json(LogoutAllResponse { revoked }),
    ))
}

/// `GET /auth/me`: the identity attached by the auth middleware.
pub async fn me_handler(
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
) -> Json<MeResponse> {
    Json(MeResponse {
        username: identity.0,
        authenticated: true,
    })
}

/// `GET /auth/sessions`: number of live sessions.
pub async fn sessions_handler(
    State(state): State<AppState>,
) -> AppResult<Json<SessionCountResponse>> {
    Ok(Json(SessionCountResponse {
        active_sessions: auth::active_sessions(&state)?,
    }))
}
