pub mod auth;
pub mod leaderboard;
pub mod middleware;
pub mod protocol;
pub mod state;
pub mod tasks;
pub mod ws;

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

// Re-export the handlers used by the binary that builds the web router.
pub use middleware::require_auth;
pub use ws::ws_handler;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        tasks::create_task_handler,
        tasks::list_tasks_handler,
        tasks::complete_task_handler,
        leaderboard::leaderboard_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RefreshResponse,
            tasks::CreateTaskRequest,
            tasks::TaskBody,
            tasks::CreateTaskResponse,
            tasks::TaskListResponse,
            tasks::CompleteTaskResponse,
            leaderboard::LeaderboardResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Questlog API", description = "Task tracking with XP progression and a live leaderboard.")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
