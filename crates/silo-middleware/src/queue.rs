//! Bounded, ordered event queue.
//!
//! The broadcast [`EventBus`](crate::EventBus) drops the oldest events when a
//! receiver falls behind. Pipeline inputs and recorded outputs must not be
//! dropped, so they travel through a [`tokio::sync::mpsc`] channel instead: a
//! sender waits while the queue is full, and the single receiver sees events
//! in the order they were sent.

use silo_types::{Event, SiloError};
use tokio::sync::mpsc;

/// Events a queue holds before senders start to wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Sending half of an event queue. Clones feed the same receiver.
#[derive(Clone, Debug)]
pub struct QueueSender(mpsc::Sender<Event>);

/// Receiving half of an event queue.
#[derive(Debug)]
pub struct QueueReceiver(mpsc::Receiver<Event>);

/// Create a queue holding at most `capacity` events.
pub fn event_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueSender(tx), QueueReceiver(rx))
}

impl QueueSender {
    /// Enqueue `event`, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// [`SiloError::Channel`] when the receiver has been dropped.
    pub async fn send(&self, event: Event) -> Result<(), SiloError> {
        self.0
            .send(event)
            .await
            .map_err(|_| SiloError::Channel("event queue receiver dropped".to_string()))
    }
}

impl QueueReceiver {
    /// Next event in send order; `None` once every sender is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_types::{EventPayload, Pose};
    use std::time::Duration;

    fn pose_event(x: f64) -> Event {
        let mut pose = Pose::default();
        pose.position.x = x;
        Event::new("test::queue", EventPayload::Odometry(pose))
    }

    fn x_of(event: &Event) -> f64 {
        match &event.payload {
            EventPayload::Odometry(pose) => pose.position.x,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() -> Result<(), Box<dyn std::error::Error>> {
        let (tx, mut rx) = event_queue(4);
        for i in 0..4 {
            tx.send(pose_event(f64::from(i))).await?;
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(x_of(&event));
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0]);
        Ok(())
    }

    #[tokio::test]
    async fn full_queue_makes_the_sender_wait() -> Result<(), Box<dyn std::error::Error>> {
        let (tx, mut rx) = event_queue(1);
        tx.send(pose_event(0.0)).await?;

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(pose_event(1.0))).await;
        assert!(blocked.is_err(), "send must wait while the queue is full");

        assert!(rx.recv().await.is_some());
        tokio::time::timeout(Duration::from_secs(1), tx.send(pose_event(2.0))).await??;
        Ok(())
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_an_error() {
        let (tx, rx) = event_queue(4);
        drop(rx);
        assert!(matches!(tx.send(pose_event(0.0)).await, Err(SiloError::Channel(_))));
    }
}
