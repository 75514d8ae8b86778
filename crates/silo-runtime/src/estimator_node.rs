//! [`EstimatorNode`] – detector frames in, image-indexed silo states out.
//!
//! Each frame is run through [`SiloStateEstimator`] and the result is
//! published on `StateImage`. A rejected frame (too many silos) publishes
//! nothing on `StateImage` and a `Fault` instead.

use silo_middleware::{EventBus, QueueSender, Topic};
use silo_perception::SiloStateEstimator;
use silo_types::{DetectionArray, EventPayload, SiloArray};

use crate::node::NodeOutputs;

pub struct EstimatorNode {
    estimator: SiloStateEstimator,
    outputs: NodeOutputs,
}

impl EstimatorNode {
    pub fn new(estimator: SiloStateEstimator, bus: &EventBus, sink: Option<QueueSender>) -> Self {
        Self {
            estimator,
            outputs: NodeOutputs::new(bus, "estimator", Topic::StateImage, sink),
        }
    }

    pub fn estimator(&self) -> &SiloStateEstimator {
        &self.estimator
    }

    /// Estimate and publish the local silo states of `frame`. Returns them
    /// for the next stage, or `None` when the frame was rejected.
    pub async fn on_frame(&self, frame: &DetectionArray) -> Option<SiloArray> {
        let team = self.estimator.config().team_color;
        match self.estimator.estimate(&frame.detections, team) {
            Ok(estimate) => {
                self.outputs
                    .publish(EventPayload::StateImage(estimate.silos.clone()))
                    .await;
                Some(estimate.silos)
            }
            Err(e) => {
                self.outputs.fault(&e).await;
                None
            }
        }
    }
}
