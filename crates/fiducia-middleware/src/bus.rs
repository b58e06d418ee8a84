//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Odometry`] | Odometry estimates (pose, twist, covariance) |
//! | [`Topic::Transforms`] | Transform broadcasts mirroring each estimate |
//! | [`Topic::SystemAlerts`] | Skipped cycles, hardware faults |

use fiducia_types::Event;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Odometry estimates.
    Odometry,
    /// Frame-graph transform broadcasts.
    Transforms,
    /// Non-fatal pipeline alerts.
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    odometry: broadcast::Sender<Event>,
    transforms: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (odometry, _) = broadcast::channel(capacity);
        let (transforms, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            odometry,
            transforms,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event;
    /// `0` when nobody is listening on the topic, which is not an error.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Odometry => &self.odometry,
            Topic::Transforms => &self.transforms,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`TopicReceiver::recv`] but skips over lag, returning `None` only
    /// once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducia_types::EventPayload;

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::CycleSkipped {
                reason: "test".to_string(),
            },
        )
    }

    #[test]
    fn publish_no_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Odometry, make_event("test")), 0);
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Odometry);
        let mut subscriber2 = bus.subscribe_to(Topic::Odometry);
        assert_eq!(bus.subscriber_count(Topic::Odometry), 2);

        let event = make_event("fiducia-runtime::node");
        assert_eq!(bus.publish_to(Topic::Odometry, event.clone()), 2);

        assert_eq!(subscriber1.recv().await.unwrap().id, event.id, "subscriber 1 got wrong event");
        assert_eq!(subscriber2.recv().await.unwrap().id, event.id, "subscriber 2 got wrong event");
    }

    /// A subscriber on `SystemAlerts` must not receive events published to
    /// `Odometry` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut alerts_sub = bus.subscribe_to(Topic::SystemAlerts);
        let _odom_sub = bus.subscribe_to(Topic::Odometry);

        assert_eq!(bus.publish_to(Topic::Odometry, make_event("fiducia-runtime::node")), 1);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            alerts_sub.recv(),
        )
        .await;

        assert!(
            result.is_err(),
            "SystemAlerts subscriber must not receive an Odometry event"
        );
        assert_eq!(alerts_sub.topic(), Topic::SystemAlerts);
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::Transforms);

        for _ in 0..1_000 {
            bus.publish_to(Topic::Transforms, make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn next_skips_lag_and_ends_on_close() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_to(Topic::SystemAlerts);
        for _ in 0..10 {
            bus.publish_to(Topic::SystemAlerts, make_event("flood"));
        }
        assert!(sub.next().await.is_some());
        drop(bus);
        // Drain what is left, then the closed channel yields None.
        while sub.next().await.is_some() {}
    }
}
