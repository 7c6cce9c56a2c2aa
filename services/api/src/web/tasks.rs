//! services/api/src/web/tasks.rs
//!
//! Task endpoints: creation, listing, and the completion toggle that drives
//! progression. The toggle is a dedicated state transition, never a generic
//! field patch, and its XP delta is derived on the server.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::events::{EventHub, Topic};
use crate::web::protocol::ServerEvent;
use crate::web::state::AppState;
use questlog_core::domain::{
    CompletionOutcome, NewTask, Principal, Task, TaskCategory, TaskStatus, UserStats,
};
use questlog_core::ports::Store;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// The wire form of a task.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub xp_value: i64,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Task> for TaskBody {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            category: task.category.as_str().to_string(),
            xp_value: task.xp_value,
            status: task.status.as_str().to_string(),
            due_date: task.due_date,
            created_at: task.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    pub message: String,
    pub task: TaskBody,
}

#[derive(Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskBody>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskResponse {
    pub message: String,
    /// The signed XP delta that was applied; negative when a completion is
    /// reverted.
    pub xp_award: i64,
    #[schema(value_type = Object)]
    pub user_stats: UserStats,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /tasks - Create a task owned by the caller
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created successfully", body = CreateTaskResponse),
        (status = 400, description = "Missing title or invalid category"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn create_task_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    }
    let category = TaskCategory::parse(&req.category)
        .ok_or_else(|| ApiError::Validation("Invalid category value".to_string()))?;

    let task = state
        .store
        .create_task(NewTask {
            user_id: principal.user_id,
            title: req.title.trim().to_string(),
            description: req.description,
            category,
            due_date: req.due_date,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            message: "Task created successfully".to_string(),
            task: task.into(),
        }),
    ))
}

/// GET /tasks - List the caller's tasks, newest first
#[utoipa::path(
    get,
    path = "/tasks",
    responses(
        (status = 200, description = "The caller's tasks", body = TaskListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn list_tasks_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.store.tasks_for_user(principal.user_id).await?;
    Ok(Json(TaskListResponse {
        tasks: tasks.into_iter().map(TaskBody::from).collect(),
    }))
}

/// PATCH /tasks/{id}/complete - Toggle completion and apply the XP delta
///
/// Completing awards the category reward; toggling a completed task back to
/// pending reverses it. Status and XP commit in one transaction; the
/// real-time fan-out happens after commit and can neither block nor fail the
/// request.
#[utoipa::path(
    patch,
    path = "/tasks/{id}/complete",
    params(("id" = i64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Completion toggled", body = CompleteTaskResponse),
        (status = 400, description = "Invalid task id"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Task not found or not owned by the caller"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn complete_task_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(task_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .store
        .toggle_completion(task_id, principal.user_id)
        .await?;

    // The authoritative state is committed; deliver events from a detached
    // task so a slow subscriber or a failed leaderboard read cannot affect
    // this response.
    tokio::spawn(broadcast_completion(
        state.store.clone(),
        state.events.clone(),
        outcome.clone(),
    ));

    let message = match outcome.task.status {
        TaskStatus::Completed => "Task completed successfully",
        _ => "Task completion reverted",
    };
    Ok(Json(CompleteTaskResponse {
        message: message.to_string(),
        xp_award: outcome.xp_delta,
        user_stats: outcome.stats,
    }))
}

/// Post-commit fan-out: the owner's private progress event, then the
/// recomputed leaderboard for everyone watching it. Failures are logged and
/// swallowed; staleness is repaired by the next broadcast or fetch.
async fn broadcast_completion(
    store: Arc<dyn Store>,
    events: Arc<EventHub>,
    outcome: CompletionOutcome,
) {
    let user_id = outcome.task.user_id;
    events
        .publish(
            Topic::User(user_id),
            ServerEvent::Progress {
                task_id: outcome.task.id,
                title: outcome.task.title.clone(),
                xp_delta: outcome.xp_delta,
                new_xp: outcome.stats.xp,
                level_number: outcome.stats.level_number,
                xp_to_next_level: outcome.stats.xp_to_next_level,
            },
        )
        .await;

    match store.leaderboard(10).await {
        Ok(rankings) => {
            events
                .publish(Topic::Leaderboard, ServerEvent::Leaderboard { rankings })
                .await;
        }
        Err(e) => warn!("leaderboard recompute after completion failed: {e}"),
    }
}
