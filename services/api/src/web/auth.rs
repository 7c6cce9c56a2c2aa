//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: register, login, refresh, and logout. The
//! refresh token travels only in an HttpOnly cookie scoped to the refresh
//! path; the access token is the JSON payload.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::session::AuthError;
use crate::web::state::AppState;

const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/auth/refresh";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub new_access_token: String,
}

//=========================================================================================
// Cookie Helpers
//=========================================================================================

/// Builds the Set-Cookie value carrying a fresh refresh token. Scoped to the
/// refresh path so the token is never sent with ordinary API calls.
fn refresh_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    format!(
        "{REFRESH_COOKIE}={token}; HttpOnly;{} SameSite=Lax; Path={REFRESH_COOKIE_PATH}; Max-Age={max_age_secs}",
        if secure { " Secure;" } else { "" }
    )
}

/// A Set-Cookie value that deletes the refresh cookie.
fn clear_refresh_cookie(secure: bool) -> String {
    refresh_cookie("", 0, secure)
}

/// Extracts a cookie value from a Cookie header.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|c| {
        let c = c.trim();
        c.strip_prefix(name)?.strip_prefix('=')
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully"),
        (status = 400, description = "Missing required fields"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    }

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create the user; duplicate emails surface as 409
    state
        .store
        .create_user(req.name.trim(), req.email.trim(), &password_hash)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

/// POST /auth/login - Exchange credentials for a token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    }

    // Unknown email and wrong password produce the same 401 body.
    let tokens = state.sessions.login(&req.email, &req.password).await?;

    let cookie = refresh_cookie(
        &tokens.refresh_token,
        state.sessions.refresh_ttl().as_secs(),
        state.config.cookie_secure,
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            access_token: tokens.access_token,
        }),
    ))
}

/// POST /auth/refresh - Rotate the refresh token and mint a new access token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Token rotated", body = RefreshResponse),
        (status = 401, description = "No refresh token cookie"),
        (status = 403, description = "Invalid, expired or reused refresh token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let presented = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or(AuthError::NoToken)?
        .to_string();

    match state.sessions.refresh(&presented).await {
        Ok(tokens) => {
            let cookie = refresh_cookie(
                &tokens.refresh_token,
                state.sessions.refresh_ttl().as_secs(),
                state.config.cookie_secure,
            );
            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(RefreshResponse {
                    new_access_token: tokens.access_token,
                }),
            )
                .into_response())
        }
        // A rejected refresh token is gone for good; take the cookie with it
        // so the client falls back to a full login.
        Err(AuthError::InvalidToken | AuthError::TokenReuseDetected) => Ok((
            StatusCode::FORBIDDEN,
            [(
                header::SET_COOKIE,
                clear_refresh_cookie(state.config.cookie_secure),
            )],
            Json(json!({ "message": "Invalid refresh token" })),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// POST /auth/logout - Revoke the session and clear the cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Server-side revoke is best-effort; the cookie is cleared regardless.
    if let Some(presented) = cookie_value(&headers, REFRESH_COOKIE) {
        state.sessions.logout(presented).await;
    }

    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_refresh_cookie(state.config.cookie_secure),
        )],
        Json(json!({ "message": "Logged out successfully" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_value_finds_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc.def.ghi; lang=en"),
        );
        assert_eq!(cookie_value(&headers, "refresh_token"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, "lang"), Some("en"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_value_ignores_prefix_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token_old=zzz"),
        );
        assert_eq!(cookie_value(&headers, "refresh_token"), None);
    }

    #[test]
    fn refresh_cookie_is_http_only_and_path_scoped() {
        let cookie = refresh_cookie("tok", 604800, false);
        assert!(cookie.starts_with("refresh_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/auth/refresh"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        let secure = refresh_cookie("tok", 60, true);
        assert!(secure.contains("Secure"));
    }

    #[test]
    fn clearing_sets_an_empty_value_with_zero_age() {
        let cookie = clear_refresh_cookie(false);
        assert!(cookie.starts_with("refresh_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
