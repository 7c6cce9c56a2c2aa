//! services/api/src/web/protocol.rs
//!
//! Defines the real-time events the server pushes to subscribed clients.
//! There are no client-to-server commands in this protocol; all writes go
//! through HTTP and these events only describe committed state.

use questlog_core::domain::LeaderboardEntry;
use serde::Serialize;

/// Represents the structured messages the server can push to a client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Delivered on the owner's private channel after a completion toggle
    /// commits.
    Progress {
        task_id: i64,
        title: String,
        xp_delta: i64,
        new_xp: i64,
        level_number: i32,
        xp_to_next_level: i64,
    },

    /// Delivered to every leaderboard subscriber: the freshly recomputed
    /// top rankings, never more than ten rows.
    Leaderboard { rankings: Vec<LeaderboardEntry> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_events_use_the_wire_field_names() {
        let event = ServerEvent::Progress {
            task_id: 3,
            title: "water the plants".to_string(),
            xp_delta: 25,
            new_xp: 125,
            level_number: 1,
            xp_to_next_level: 875,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["taskId"], 3);
        assert_eq!(json["xpDelta"], 25);
        assert_eq!(json["xpToNextLevel"], 875);
    }

    #[test]
    fn leaderboard_events_tag_their_rankings() {
        let event = ServerEvent::Leaderboard {
            rankings: vec![LeaderboardEntry {
                rank: 1,
                user_id: 9,
                name: "ada".to_string(),
                xp: 4000,
                level_number: 3,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "leaderboard");
        assert_eq!(json["rankings"][0]["userId"], 9);
        assert_eq!(json["rankings"][0]["levelNumber"], 3);
    }
}
