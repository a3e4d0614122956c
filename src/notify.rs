use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{ClientId, EventId, Ms};

const CHANNEL_CAPACITY: usize = 256;

/// Notification topics the engine publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Granted,
    Waitlisted,
    Changed,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Granted => "allocation.granted",
            Topic::Waitlisted => "allocation.waitlisted",
            Topic::Changed => "allocation.changed",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A seat is held for `client_id` until `deadline`.
    Granted {
        event_id: EventId,
        client_id: ClientId,
        deadline: Ms,
    },
    /// `client_id` joined the waitlist; `queue` is the full order.
    Waitlisted {
        event_id: EventId,
        client_id: ClientId,
        queue: Vec<ClientId>,
    },
    /// Something about the event changed; broadcast to everyone.
    Changed {
        event_id: EventId,
        available_seats: u32,
        total_seats: u32,
        waitlist: Vec<ClientId>,
    },
}

impl Notification {
    /// The client this notification is addressed to, if it is not a broadcast.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Notification::Granted { client_id, .. } | Notification::Waitlisted { client_id, .. } => {
                Some(client_id.as_str())
            }
            Notification::Changed { .. } => None,
        }
    }
}

/// Where the engine sends state-change notifications.
pub trait NotificationPort: Send + Sync {
    fn publish(&self, topic: Topic, payload: &Notification);
}

/// Broadcast hub: one channel per topic.
pub struct NotifyHub {
    channels: DashMap<Topic, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }
}

impl NotificationPort for NotifyHub {
    /// No-op if nobody is listening.
    fn publish(&self, topic: Topic, payload: &Notification) {
        if let Some(sender) = self.channels.get(&topic) {
            let _ = sender.send(payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(Topic::Changed);

        let n = Notification::Changed {
            event_id: Ulid::new(),
            available_seats: 1,
            total_seats: 2,
            waitlist: vec![],
        };
        hub.publish(Topic::Changed, &n);

        assert_eq!(rx.recv().await.unwrap(), n);
    }

    #[tokio::test]
    async fn topics_are_separate() {
        let hub = NotifyHub::new();
        let mut granted = hub.subscribe(Topic::Granted);
        let _changed = hub.subscribe(Topic::Changed);

        hub.publish(
            Topic::Changed,
            &Notification::Changed {
                event_id: Ulid::new(),
                available_seats: 0,
                total_seats: 1,
                waitlist: vec![],
            },
        );
        assert!(granted.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber, should not panic
        hub.publish(
            Topic::Granted,
            &Notification::Granted {
                event_id: Ulid::new(),
                client_id: "alice".into(),
                deadline: 0,
            },
        );
    }

    #[test]
    fn topic_names() {
        assert_eq!(Topic::Granted.as_str(), "allocation.granted");
        assert_eq!(Topic::Waitlisted.to_string(), "allocation.waitlisted");
        assert_eq!(Topic::Changed.as_str(), "allocation.changed");
    }

    #[test]
    fn recipient_only_for_directed_notifications() {
        let eid = Ulid::new();
        let w = Notification::Waitlisted {
            event_id: eid,
            client_id: "bob".into(),
            queue: vec!["bob".into()],
        };
        assert_eq!(w.recipient(), Some("bob"));
        let c = Notification::Changed {
            event_id: eid,
            available_seats: 0,
            total_seats: 1,
            waitlist: vec![],
        };
        assert_eq!(c.recipient(), None);
    }
}
