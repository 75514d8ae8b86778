//! `silo-middleware` – message plumbing.
//!
//! Routes asynchronous data between the detector/odometry inputs, the
//! estimation pipeline and external clients without caring about the data's
//! meaning.
//!
//! # Modules
//!
//! - [`queue`] – Bounded, ordered event queue for pipeline inputs and
//!   recorded outputs.
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels, for live observers.
//! - [`bridge`] – NDJSON ingest and WebSocket fan-out of silo states.

pub mod bridge;
pub mod bus;
pub mod queue;

pub use bridge::SiloBridge;
pub use bus::{EventBus, Topic, TopicPublisher, TopicReceiver};
pub use queue::{DEFAULT_QUEUE_CAPACITY, QueueReceiver, QueueSender, event_queue};
