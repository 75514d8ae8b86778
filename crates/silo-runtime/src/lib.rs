//! `silo-runtime` – the event-driven silo pipeline.
//!
//! One task drains the bounded input queue in arrival order and runs both
//! stages for every record:
//!
//! ```text
//! input queue ──▶ Detections ──▶ EstimatorNode ──▶ StateImage ──▶ MatcherNode ──▶ StateMap
//!             └─▶ Odometry ─────────────────────────────────────────▶┘
//! ```
//!
//! Results go to the broadcast [`EventBus`] for live observers and, when a
//! sink queue is given, to that sink without loss. A full sink slows the
//! pipeline down, which in turn makes ingest wait on the input queue.
//!
//! # Modules
//!
//! - [`estimator_node`] – [`EstimatorNode`]: runs the silo state estimator on
//!   every detector frame.
//! - [`matcher_node`] – [`MatcherNode`]: keeps the latest pose and re-indexes
//!   local silo states against the world model.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with an
//!   optional OTLP span exporter.

pub mod estimator_node;
pub mod matcher_node;
pub mod node;
pub mod telemetry;

use silo_middleware::{EventBus, QueueReceiver, QueueSender};
use silo_perception::{EstimatorConfig, GlobalSiloMatcher, MatcherConfig, SiloStateEstimator};
use silo_types::{EventPayload, SiloError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use estimator_node::EstimatorNode;
pub use matcher_node::MatcherNode;
pub use telemetry::{TelemetryGuard, init_tracing};

/// Handle of a running pipeline task.
pub struct Pipeline {
    task: JoinHandle<()>,
}

impl Pipeline {
    /// Build both stages and spawn the task draining `inputs`.
    ///
    /// Every output is published on `bus`; when `sink` is set it is also
    /// queued there, in order.
    ///
    /// # Errors
    ///
    /// [`SiloError::Config`] when the matcher configuration is invalid.
    pub fn spawn(
        bus: &EventBus,
        inputs: QueueReceiver,
        sink: Option<QueueSender>,
        estimator: EstimatorConfig,
        matcher: &MatcherConfig,
    ) -> Result<Self, SiloError> {
        let matcher = MatcherNode::new(GlobalSiloMatcher::new(matcher)?, bus, sink.clone());
        let estimator = EstimatorNode::new(SiloStateEstimator::new(estimator), bus, sink);
        Ok(Self {
            task: tokio::spawn(drive(estimator, matcher, inputs)),
        })
    }

    /// Wait for the task to stop. It stops once every sender of the input
    /// queue has been dropped and the queue is drained.
    pub async fn join(&mut self) {
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                error!(error = %e, "pipeline task failed");
            }
        }
    }

    /// Stop the task immediately. Dropping it releases the sink.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn drive(estimator: EstimatorNode, mut matcher: MatcherNode, mut inputs: QueueReceiver) {
    info!(
        team = %estimator.estimator().config().team_color,
        silos = matcher.matcher().world_model().len(),
        "pipeline started"
    );
    while let Some(event) = inputs.recv().await {
        match event.payload {
            EventPayload::Detections(frame) => {
                if let Some(local) = estimator.on_frame(&frame).await {
                    matcher.on_local(&local).await;
                }
            }
            EventPayload::Odometry(pose) => matcher.on_pose(&pose).await,
            _ => debug!(source = %event.source, "ignoring non-input event"),
        }
    }
    info!("pipeline stopped");
}
