//! services/api/src/web/ws.rs
//!
//! The real-time delivery endpoint. A connection authenticates once, at
//! handshake time, and is then subscribed to its owner's private topic and
//! the shared leaderboard topic. The server only pushes; client frames carry
//! no commands.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use crate::error::ApiError;
use crate::events::Topic;
use crate::session::AuthError;
use crate::web::state::AppState;
use questlog_core::domain::Principal;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
///
/// The access token rides in the query string and is verified before the
/// upgrade; a missing or invalid token is refused at handshake, never per
/// message.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let token = query.token.ok_or(AuthError::Unauthorized)?;
    let principal = state.sessions.authenticate(&token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, principal)))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    info!("WebSocket connection established for user {}", principal.user_id);

    let mut user_rx = state.events.subscribe(Topic::User(principal.user_id)).await;
    let mut board_rx = state.events.subscribe(Topic::Leaderboard).await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = user_rx.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("failed to serialize progress event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // Missed events are gone; delivery is at-most-once.
                Err(RecvError::Lagged(skipped)) => {
                    info!(user_id = principal.user_id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            event = board_rx.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("failed to serialize leaderboard event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    info!(user_id = principal.user_id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                // No client commands exist; only the close handshake matters.
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    info!("WebSocket connection closed for user {}", principal.user_id);
}
