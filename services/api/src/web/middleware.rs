//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::session::AuthError;
use crate::web::state::AppState;

/// Middleware that validates the bearer access token and establishes the
/// authenticated principal.
///
/// If valid, inserts the `Principal` into request extensions for handlers to
/// use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the Authorization header
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    // 2. Pull the token out of the "Bearer <token>" form
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Unauthorized)?;

    // 3. Resolve the token to a principal
    let principal = state.sessions.authenticate(token)?;

    // 4. Insert the principal into request extensions
    req.extensions_mut().insert(principal);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
