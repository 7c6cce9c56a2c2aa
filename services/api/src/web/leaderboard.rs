//! services/api/src/web/leaderboard.rs
//!
//! The on-demand leaderboard projection.

use axum::{extract::{Query, State}, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::state::AppState;
use questlog_core::domain::LeaderboardEntry;

/// Rows returned regardless of how many were asked for.
const MAX_LIMIT: u32 = 10;

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaderboardResponse {
    #[schema(value_type = Vec<Object>)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Clamps a requested limit to the server-side cap.
fn clamp_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(MAX_LIMIT).min(MAX_LIMIT)
}

/// GET /leaderboard - Top users by XP, recomputed on every call
#[utoipa::path(
    get,
    path = "/leaderboard",
    params(("limit" = Option<u32>, Query, description = "Requested rows, capped at 10")),
    responses(
        (status = 200, description = "Ranked users", body = LeaderboardResponse),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let leaderboard = state.store.leaderboard(clamp_limit(query.limit)).await?;
    Ok(Json(LeaderboardResponse { leaderboard }))
}
