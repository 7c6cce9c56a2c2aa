//! services/api/src/events.rs
//!
//! Transport-independent publish/subscribe hub for post-commit events. The
//! websocket layer subscribes connections to topics; nothing here knows what
//! a socket is. Delivery is at-most-once and fire-and-forget: channels are
//! bounded, there is no backlog or replay, and a subscriber that lagged or
//! disconnected simply misses updates.

use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::web::protocol::ServerEvent;

/// Per-channel buffer before the oldest undelivered event is dropped.
const CHANNEL_CAPACITY: usize = 32;

/// The two delivery domains: a private channel per user and one shared
/// leaderboard channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    User(i64),
    Leaderboard,
}

/// Fan-out hub shared across all connections.
pub struct EventHub {
    leaderboard: broadcast::Sender<ServerEvent>,
    users: RwLock<HashMap<i64, broadcast::Sender<ServerEvent>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (leaderboard, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            leaderboard,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to a topic. The receiver only sees events published after
    /// this call; there is no replay.
    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ServerEvent> {
        match topic {
            Topic::Leaderboard => self.leaderboard.subscribe(),
            Topic::User(user_id) => {
                let mut users = self.users.write().await;
                users
                    .entry(user_id)
                    .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                    .subscribe()
            }
        }
    }

    /// Publishes an event, returning how many subscribers it reached. A send
    /// with no listeners is not an error; the event is simply dropped.
    pub async fn publish(&self, topic: Topic, event: ServerEvent) -> usize {
        match topic {
            Topic::Leaderboard => self.leaderboard.send(event).unwrap_or(0),
            Topic::User(user_id) => {
                let delivered = {
                    let users = self.users.read().await;
                    match users.get(&user_id) {
                        Some(sender) => sender.send(event).ok(),
                        None => return 0,
                    }
                };
                match delivered {
                    Some(n) => n,
                    None => {
                        // Last receiver went away; drop the channel.
                        let mut users = self.users.write().await;
                        if users
                            .get(&user_id)
                            .is_some_and(|s| s.receiver_count() == 0)
                        {
                            users.remove(&user_id);
                        }
                        0
                    }
                }
            }
        }
    }

    #[cfg(test)]
    async fn user_channel_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn progress_event(task_id: i64) -> ServerEvent {
        ServerEvent::Progress {
            task_id,
            title: "stretch".to_string(),
            xp_delta: 50,
            new_xp: 50,
            level_number: 1,
            xp_to_next_level: 950,
        }
    }

    #[tokio::test]
    async fn user_topics_are_private() {
        let hub = EventHub::new();
        let mut alice = hub.subscribe(Topic::User(1)).await;
        let mut bob = hub.subscribe(Topic::User(2)).await;

        let delivered = hub.publish(Topic::User(1), progress_event(10)).await;
        assert_eq!(delivered, 1);

        assert!(matches!(
            alice.try_recv().unwrap(),
            ServerEvent::Progress { task_id: 10, .. }
        ));
        assert_eq!(bob.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn leaderboard_topic_reaches_every_subscriber() {
        let hub = EventHub::new();
        let mut a = hub.subscribe(Topic::Leaderboard).await;
        let mut b = hub.subscribe(Topic::Leaderboard).await;

        let delivered = hub
            .publish(
                Topic::Leaderboard,
                ServerEvent::Leaderboard { rankings: vec![] },
            )
            .await;
        assert_eq!(delivered, 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let hub = EventHub::new();
        // Published into the void: no one is listening.
        let delivered = hub.publish(Topic::User(1), progress_event(1)).await;
        assert_eq!(delivered, 0);

        let mut late = hub.subscribe(Topic::User(1)).await;
        assert_eq!(late.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn dead_user_channels_are_dropped() {
        let hub = EventHub::new();
        let receiver = hub.subscribe(Topic::User(1)).await;
        assert_eq!(hub.user_channel_count().await, 1);

        drop(receiver);
        hub.publish(Topic::User(1), progress_event(1)).await;
        assert_eq!(hub.user_channel_count().await, 0);
    }
}
