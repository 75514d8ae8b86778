//! Output side shared by the pipeline nodes.

use silo_middleware::{EventBus, QueueSender, Topic, TopicPublisher};
use silo_types::{Event, EventPayload, SiloError};
use tracing::{debug, warn};

/// A node's result topic, the shared `Faults` topic and an optional lossless
/// sink that records every output in order.
#[derive(Debug, Clone)]
pub struct NodeOutputs {
    component: &'static str,
    source: String,
    results: TopicPublisher,
    faults: TopicPublisher,
    sink: Option<QueueSender>,
}

impl NodeOutputs {
    pub fn new(
        bus: &EventBus,
        component: &'static str,
        results: Topic,
        sink: Option<QueueSender>,
    ) -> Self {
        Self {
            component,
            source: format!("silo-runtime::{component}"),
            results: bus.publisher(results),
            faults: bus.publisher(Topic::Faults),
            sink,
        }
    }

    /// Publish a result. Nobody listening on the bus is not an error for a
    /// node; the sink, when present, waits for room.
    pub async fn publish(&self, payload: EventPayload) {
        let event = Event::new(self.source.clone(), payload);
        self.emit(&self.results, event).await;
    }

    /// Log `error` and publish it as a `Fault` event.
    pub async fn fault(&self, error: &SiloError) {
        warn!(component = self.component, error = %error, "frame rejected");
        let payload = EventPayload::Fault {
            component: self.component.to_string(),
            message: error.to_string(),
        };
        let event = Event::new(self.source.clone(), payload);
        self.emit(&self.faults, event).await;
    }

    async fn emit(&self, topic: &TopicPublisher, event: Event) {
        let recorded = self.sink.as_ref().map(|_| event.clone());
        if let Err(e) = topic.publish(event) {
            debug!(component = self.component, error = %e, "no live subscribers");
        }
        if let (Some(sink), Some(event)) = (&self.sink, recorded) {
            if let Err(e) = sink.send(event).await {
                debug!(component = self.component, error = %e, "sink closed");
            }
        }
    }
}
