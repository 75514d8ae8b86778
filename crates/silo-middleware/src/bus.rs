//! In-process publish/subscribe bus for pipeline events.
//!
//! One [`tokio::sync::broadcast`] channel per [`Topic`]: every receiver sees
//! every event, and a receiver that falls behind loses the oldest ones
//! instead of stalling the publisher. Live observers such as WebSocket
//! clients read from here; pipeline inputs go through the lossless
//! [`queue`](crate::queue) instead.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::StateImage`] | Silo states indexed by image rank |
//! | [`Topic::StateMap`] | Silo states indexed by the world model |
//! | [`Topic::Faults`] | Rejected frames |

use silo_types::{Event, SiloError};
use tokio::sync::broadcast;
use tracing::warn;

/// Events buffered per topic before slow receivers start to lag.
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    StateImage,
    StateMap,
    Faults,
}

/// Sending side of every topic. Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    state_image: broadcast::Sender<Event>,
    state_map: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Each topic gets its own buffer of `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (state_image, _) = broadcast::channel(capacity);
        let (state_map, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        Self {
            state_image,
            state_map,
            faults,
        }
    }

    /// Send `event` on `topic`; returns how many receivers got it.
    ///
    /// # Errors
    ///
    /// [`SiloError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, SiloError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| SiloError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// New receiver for `topic`. It only sees events sent after this call.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// A send-only handle for `topic`.
    ///
    /// Unlike a clone of the whole bus, a publisher keeps only its own topic
    /// open, so a topic closes once every bus and publisher for it is gone.
    pub fn publisher(&self, topic: Topic) -> TopicPublisher {
        TopicPublisher {
            topic,
            sender: self.topic_sender(topic).clone(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::StateImage => &self.state_image,
            Topic::StateMap => &self.state_map,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── Single-topic handles ────────────────────────────────────────────────────

/// Send half bound to a single [`Topic`]. Obtained via
/// [`EventBus::publisher`].
#[derive(Clone, Debug)]
pub struct TopicPublisher {
    topic: Topic,
    sender: broadcast::Sender<Event>,
}

impl TopicPublisher {
    /// Same contract as [`EventBus::publish_to`].
    pub fn publish(&self, event: Event) -> Result<usize, SiloError> {
        let topic = self.topic;
        self.sender
            .send(event)
            .map_err(|_| SiloError::Channel(format!("No subscribers for topic {topic:?}")))
    }
}

/// Receive half bound to a single [`Topic`]. Obtained via
/// [`EventBus::subscribe_to`].
#[derive(Debug)]
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Raw receive. `Lagged(n)` means `n` events were skipped; `Closed`
    /// means every sender is gone and the buffer is empty.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, logging and skipping over lag.
    ///
    /// Returns `None` once the topic is closed and drained.
    pub async fn recv_fresh(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
