//! crates/questlog_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;

use crate::domain::{
    CompletionOutcome, LeaderboardEntry, NewTask, Task, User, UserCredentials, UserStats,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Port (Trait)
//=========================================================================================

/// The persistence contract for users, tasks, progression and the refresh
/// token registry. One coarse trait: every method is a complete operation,
/// and the cross-row invariants (task status vs XP, hash rotation) are
/// honored inside single implementations rather than assumed across calls.
#[async_trait]
pub trait Store: Send + Sync {
    // --- User Management ---

    /// Creates a user. Fails with `Conflict` when the email is taken.
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User>;

    async fn credentials_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>>;

    // --- Refresh Token Registry ---
    // Only one-way digests are ever stored; at most one per user.

    /// Stores `hash` as the user's trusted refresh digest, overwriting any
    /// prior value. Logging in invalidates other outstanding sessions.
    async fn store_refresh_hash(&self, user_id: i64, hash: &str) -> PortResult<()>;

    /// Atomically replaces the stored digest with `next` only if it still
    /// equals `expected`. Returns false when the digest no longer matches,
    /// which the caller must treat as token reuse.
    async fn rotate_refresh_hash(
        &self,
        user_id: i64,
        expected: &str,
        next: &str,
    ) -> PortResult<bool>;

    /// Revokes the user's session by clearing the stored digest.
    async fn clear_refresh_hash(&self, user_id: i64) -> PortResult<()>;

    /// Revokes whichever session currently holds `hash`, if any.
    async fn clear_refresh_hash_by_value(&self, hash: &str) -> PortResult<()>;

    // --- Tasks ---

    /// Persists a task with its XP value derived from the category.
    async fn create_task(&self, task: NewTask) -> PortResult<Task>;

    async fn tasks_for_user(&self, user_id: i64) -> PortResult<Vec<Task>>;

    /// Toggles completion of a task owned by `user_id` inside one
    /// transaction: status write, signed XP delta and level recompute commit
    /// together or not at all. `NotFound` when the task is absent or owned
    /// by someone else.
    async fn toggle_completion(&self, task_id: i64, user_id: i64)
        -> PortResult<CompletionOutcome>;

    // --- Progression Ledger ---

    /// Applies a signed XP delta with the zero floor and a full level
    /// recompute. `NotFound` if the user row disappeared between read and
    /// write.
    async fn apply_xp_delta(&self, user_id: i64, delta: i64) -> PortResult<UserStats>;

    // --- Leaderboard ---

    /// The top `limit` users by XP descending, ties broken by id ascending.
    /// Recomputed on demand, never cached.
    async fn leaderboard(&self, limit: u32) -> PortResult<Vec<LeaderboardEntry>>;
}
