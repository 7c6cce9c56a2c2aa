//! crates/questlog_core/src/domain.rs
//!
//! Defines the pure, core data structures and transition rules for the
//! application. These are independent of any database or web framework;
//! everything with an invariant attached lives here so it can be tested
//! without IO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed task categories. The XP reward is derived from the category on the
/// server and never accepted from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Todo,
    Habit,
}

impl TaskCategory {
    /// The XP awarded when a task of this category is completed.
    pub fn xp_reward(self) -> i64 {
        match self {
            TaskCategory::Todo => 25,
            TaskCategory::Habit => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Todo => "todo",
            TaskCategory::Habit => "habit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskCategory::Todo),
            "habit" => Some(TaskCategory::Habit),
            _ => None,
        }
    }
}

/// Completion status of a task. `InProgress` is bookkeeping only: the
/// completion engine never writes it, but treats it as not-yet-completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// The result of toggling a task's completion: the status to write and the
/// signed XP delta to apply in the same transaction.
///
/// The toggle is its own inverse. Completing awards `+reward`, un-completing
/// reverses it with `-reward`, so two consecutive toggles net zero.
pub fn completion_transition(status: TaskStatus, reward: i64) -> (TaskStatus, i64) {
    match status {
        TaskStatus::Pending | TaskStatus::InProgress => (TaskStatus::Completed, reward),
        TaskStatus::Completed => (TaskStatus::Pending, -reward),
    }
}

/// Applies a signed XP delta, flooring at zero. A reversal applied out of
/// order can never drive XP negative.
pub fn apply_delta(xp: i64, delta: i64) -> i64 {
    (xp + delta).max(0)
}

/// An ordered level tier. Static reference data with unique tier numbers and
/// unique thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub id: i64,
    pub level_number: i32,
    pub required_xp: i64,
}

/// The tier with the highest threshold <= `xp`, falling back to the lowest
/// tier when xp is below every threshold. A monotonic step function of XP,
/// recomputed in full on every call rather than incremented, so it
/// self-heals from any prior inconsistency.
///
/// `levels` must be sorted by `required_xp` ascending and non-empty.
pub fn level_for_xp(levels: &[Level], xp: i64) -> &Level {
    levels
        .iter()
        .rev()
        .find(|l| l.required_xp <= xp)
        .unwrap_or(&levels[0])
}

/// Progression snapshot returned after every XP mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub xp: i64,
    pub level_number: i32,
    pub required_xp: i64,
    /// XP remaining until the next tier; 0 at the top tier.
    pub xp_to_next_level: i64,
}

/// Derives the full stats snapshot for `xp` from the level table.
///
/// `levels` must be sorted by `required_xp` ascending and non-empty.
pub fn stats_for(levels: &[Level], xp: i64) -> UserStats {
    let level = level_for_xp(levels, xp);
    let xp_to_next_level = levels
        .iter()
        .find(|l| l.required_xp > xp)
        .map(|next| next.required_xp - xp)
        .unwrap_or(0);
    UserStats {
        xp,
        level_number: level.level_number,
        required_xp: level.required_xp,
        xp_to_next_level,
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub xp: i64,
    pub is_admin: bool,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: i64,
    pub email: String,
    pub password_hash: String,
}

/// A task owned by exactly one user.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub xp_value: i64,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a task. `xp_value` is intentionally absent:
/// the store derives it from the category.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub due_date: Option<DateTime<Utc>>,
}

/// The committed outcome of one completion toggle.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub task: Task,
    /// The signed XP delta that was applied, always server-derived.
    pub xp_delta: i64,
    /// Fresh stats read back inside the same transaction.
    pub stats: UserStats,
}

/// One row of the derived leaderboard projection; never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub xp: i64,
    pub level_number: i32,
}

/// The authenticated principal, established once at the boundary and passed
/// explicitly through the call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<Level> {
        // Thresholds from the seeded reference data.
        [0, 1000, 3000, 6000, 10000, 15000]
            .iter()
            .enumerate()
            .map(|(i, &required_xp)| Level {
                id: i as i64 + 1,
                level_number: i as i32 + 1,
                required_xp,
            })
            .collect()
    }

    #[test]
    fn category_rewards_are_fixed() {
        assert_eq!(TaskCategory::Todo.xp_reward(), 25);
        assert_eq!(TaskCategory::Habit.xp_reward(), 50);
    }

    #[test]
    fn toggle_is_its_own_inverse() {
        let (status, delta) = completion_transition(TaskStatus::Pending, 25);
        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(delta, 25);

        let (status, delta) = completion_transition(status, 25);
        assert_eq!(status, TaskStatus::Pending);
        assert_eq!(delta, -25);
    }

    #[test]
    fn in_progress_counts_as_not_completed() {
        let (status, delta) = completion_transition(TaskStatus::InProgress, 50);
        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(delta, 50);
    }

    #[test]
    fn double_toggle_round_trips_xp() {
        let start = 300;
        let (_, up) = completion_transition(TaskStatus::Pending, 50);
        let (_, down) = completion_transition(TaskStatus::Completed, 50);
        assert_eq!(apply_delta(apply_delta(start, up), down), start);
    }

    #[test]
    fn delta_floors_at_zero() {
        assert_eq!(apply_delta(10, -25), 0);
        assert_eq!(apply_delta(0, -50), 0);
        assert_eq!(apply_delta(0, 25), 25);
    }

    #[test]
    fn level_is_highest_threshold_at_or_below_xp() {
        let levels = tiers();
        assert_eq!(level_for_xp(&levels, 0).level_number, 1);
        assert_eq!(level_for_xp(&levels, 999).level_number, 1);
        assert_eq!(level_for_xp(&levels, 1000).level_number, 2);
        assert_eq!(level_for_xp(&levels, 2999).level_number, 2);
        assert_eq!(level_for_xp(&levels, 15000).level_number, 6);
        assert_eq!(level_for_xp(&levels, 1_000_000).level_number, 6);
    }

    #[test]
    fn level_is_monotonic_in_xp() {
        let levels = tiers();
        let mut prev = 0;
        for xp in (0..20_000).step_by(250) {
            let n = level_for_xp(&levels, xp).level_number;
            assert!(n >= prev, "level regressed at xp={xp}");
            prev = n;
        }
    }

    #[test]
    fn stats_report_distance_to_next_tier() {
        let levels = tiers();
        let stats = stats_for(&levels, 400);
        assert_eq!(stats.level_number, 1);
        assert_eq!(stats.required_xp, 0);
        assert_eq!(stats.xp_to_next_level, 600);
    }

    #[test]
    fn stats_at_top_tier_report_zero_to_next() {
        let levels = tiers();
        let stats = stats_for(&levels, 20_000);
        assert_eq!(stats.level_number, 6);
        assert_eq!(stats.xp_to_next_level, 0);
    }

    #[test]
    fn completing_a_todo_from_zero() {
        let levels = tiers();
        let (_, delta) = completion_transition(TaskStatus::Pending, TaskCategory::Todo.xp_reward());
        let xp = apply_delta(0, delta);
        assert_eq!(xp, 25);

        let (_, delta) =
            completion_transition(TaskStatus::Completed, TaskCategory::Todo.xp_reward());
        let xp = apply_delta(xp, delta);
        assert_eq!(xp, 0);
        assert_eq!(stats_for(&levels, xp).level_number, 1);
    }

    #[test]
    fn habit_completion_crosses_a_level_boundary() {
        let levels = tiers();
        let (_, delta) =
            completion_transition(TaskStatus::Pending, TaskCategory::Habit.xp_reward());
        let xp = apply_delta(999, delta);
        assert_eq!(xp, 1049);
        let stats = stats_for(&levels, xp);
        assert_eq!(stats.level_number, 2);
        assert_eq!(stats.required_xp, 1000);
        assert_eq!(stats.xp_to_next_level, 3000 - 1049);
    }

    #[test]
    fn status_and_category_round_trip_their_wire_names() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        for category in [TaskCategory::Todo, TaskCategory::Habit] {
            assert_eq!(TaskCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(TaskCategory::parse("chore"), None);
    }
}
