//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `Store` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The two multi-row operations with invariants (the completion toggle and
//! the XP ledger) run inside explicit transactions with `FOR UPDATE` row
//! locks, so concurrent callers serialize on the rows they touch instead of
//! losing updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use questlog_core::domain::{
    self, CompletionOutcome, LeaderboardEntry, Level, NewTask, Task, TaskCategory, TaskStatus,
    User, UserCredentials, UserStats,
};
use questlog_core::ports::{PortError, PortResult, Store};

/// Hard cap on leaderboard size, enforced regardless of the requested limit.
const LEADERBOARD_CAP: u32 = 10;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `Store` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    name: String,
    email: String,
    xp: i64,
    is_admin: bool,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            xp: self.xp,
            is_admin: self.is_admin,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: i64,
    email: String,
    password_hash: String,
}

impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct TaskRecord {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    category: String,
    xp_value: i64,
    status: String,
    due_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TaskRecord {
    fn to_domain(self) -> PortResult<Task> {
        let category = TaskCategory::parse(&self.category).ok_or_else(|| {
            PortError::Unexpected(format!("unknown task category '{}'", self.category))
        })?;
        let status = TaskStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown task status '{}'", self.status))
        })?;
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            category,
            xp_value: self.xp_value,
            status,
            due_date: self.due_date,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct LevelRecord {
    id: i64,
    level_number: i32,
    required_xp: i64,
}

impl LevelRecord {
    fn to_domain(self) -> Level {
        Level {
            id: self.id,
            level_number: self.level_number,
            required_xp: self.required_xp,
        }
    }
}

#[derive(FromRow)]
struct LeaderboardRecord {
    rank: i64,
    user_id: i64,
    name: String,
    xp: i64,
    level_number: i32,
}

impl LeaderboardRecord {
    fn to_domain(self) -> LeaderboardEntry {
        LeaderboardEntry {
            rank: self.rank,
            user_id: self.user_id,
            name: self.name,
            xp: self.xp,
            level_number: self.level_number,
        }
    }
}

//=========================================================================================
// Transaction-Scoped Helpers
//=========================================================================================

/// Loads the level table, ascending by threshold. Static reference data, but
/// read inside the transaction so the recompute and the write see one
/// snapshot.
async fn load_levels(tx: &mut Transaction<'_, Postgres>) -> PortResult<Vec<Level>> {
    let records = sqlx::query_as::<_, LevelRecord>(
        "SELECT id, level_number, required_xp FROM levels ORDER BY required_xp ASC",
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(unexpected)?;
    if records.is_empty() {
        return Err(PortError::Unexpected("level table is empty".to_string()));
    }
    Ok(records.into_iter().map(LevelRecord::to_domain).collect())
}

/// Applies a signed XP delta to a row-locked user: floors at zero, recomputes
/// the level from scratch, writes both, and returns the fresh stats. Must be
/// called inside the transaction that owns the surrounding invariant.
async fn apply_delta_locked(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    delta: i64,
) -> PortResult<UserStats> {
    let current: Option<(i64,)> = sqlx::query_as("SELECT xp FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unexpected)?;
    let (xp,) =
        current.ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

    let new_xp = domain::apply_delta(xp, delta);
    let levels = load_levels(tx).await?;
    let level = domain::level_for_xp(&levels, new_xp);

    sqlx::query("UPDATE users SET xp = $1, level_id = $2 WHERE id = $3")
        .bind(new_xp)
        .bind(level.id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(unexpected)?;

    Ok(domain::stats_for(&levels, new_xp))
}

//=========================================================================================
// `Store` Trait Implementation
//=========================================================================================

#[async_trait]
impl Store for PgStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (name, email, password_hash, level_id) \
             VALUES ($1, $2, $3, (SELECT id FROM levels ORDER BY required_xp ASC LIMIT 1)) \
             RETURNING id, name, email, xp, is_admin",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict("User already exists".to_string())
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn credentials_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(CredentialsRecord::to_domain))
    }

    async fn store_refresh_hash(&self, user_id: i64, hash: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET refresh_token_hash = $1 WHERE id = $2")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn rotate_refresh_hash(
        &self,
        user_id: i64,
        expected: &str,
        next: &str,
    ) -> PortResult<bool> {
        // Compare-and-swap on the single stored digest. The row lock taken
        // by UPDATE serializes concurrent rotations of the same token: the
        // first writer wins, later ones match zero rows.
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = $1 \
             WHERE id = $2 AND refresh_token_hash = $3",
        )
        .bind(next)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_hash(&self, user_id: i64) -> PortResult<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn clear_refresh_hash_by_value(&self, hash: &str) -> PortResult<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = NULL WHERE refresh_token_hash = $1")
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> PortResult<Task> {
        // xp_value is derived from the category here, never client-supplied.
        let record = sqlx::query_as::<_, TaskRecord>(
            "INSERT INTO tasks (user_id, title, description, category, xp_value, status, due_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, title, description, category, xp_value, status, due_date, created_at",
        )
        .bind(task.user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.category.as_str())
        .bind(task.category.xp_reward())
        .bind(TaskStatus::Pending.as_str())
        .bind(task.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn tasks_for_user(&self, user_id: i64) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(
            "SELECT id, user_id, title, description, category, xp_value, status, due_date, created_at \
             FROM tasks WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(TaskRecord::to_domain).collect()
    }

    async fn toggle_completion(
        &self,
        task_id: i64,
        user_id: i64,
    ) -> PortResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Scoped to the owner: someone else's task is indistinguishable
        // from a missing one. FOR UPDATE serializes concurrent toggles of
        // the same task; the loser blocks here and then sees the flipped
        // status.
        let record = sqlx::query_as::<_, TaskRecord>(
            "SELECT id, user_id, title, description, category, xp_value, status, due_date, created_at \
             FROM tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        let task = record
            .ok_or_else(|| PortError::NotFound("Task not found".to_string()))?
            .to_domain()?;

        let (next_status, xp_delta) =
            domain::completion_transition(task.status, task.xp_value);

        sqlx::query("UPDATE tasks SET status = $1, updated_at = now() WHERE id = $2")
            .bind(next_status.as_str())
            .bind(task.id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let stats = apply_delta_locked(&mut tx, user_id, xp_delta).await?;

        tx.commit().await.map_err(unexpected)?;

        Ok(CompletionOutcome {
            task: Task {
                status: next_status,
                ..task
            },
            xp_delta,
            stats,
        })
    }

    async fn apply_xp_delta(&self, user_id: i64, delta: i64) -> PortResult<UserStats> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let stats = apply_delta_locked(&mut tx, user_id, delta).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(stats)
    }

    async fn leaderboard(&self, limit: u32) -> PortResult<Vec<LeaderboardEntry>> {
        // Ties broken by id so equal-XP users always rank identically.
        let records = sqlx::query_as::<_, LeaderboardRecord>(
            "SELECT ROW_NUMBER() OVER (ORDER BY u.xp DESC, u.id ASC) AS rank, \
                    u.id AS user_id, u.name, u.xp, \
                    COALESCE(l.level_number, (SELECT level_number FROM levels ORDER BY required_xp ASC LIMIT 1)) AS level_number \
             FROM users u \
             LEFT JOIN levels l ON u.level_id = l.id \
             ORDER BY u.xp DESC, u.id ASC \
             LIMIT $1",
        )
        .bind(i64::from(limit.min(LEADERBOARD_CAP)))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(LeaderboardRecord::to_domain)
            .collect())
    }
}
