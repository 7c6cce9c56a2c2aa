//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::events::EventHub;
use crate::session::SessionManager;
use questlog_core::ports::Store;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionManager>,
    pub events: Arc<EventHub>,
    pub config: Arc<Config>,
}
