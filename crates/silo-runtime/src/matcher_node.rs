//! [`MatcherNode`] – poses and local silo states in, map-indexed states out.
//!
//! The node owns the matcher, so the latest pose has a single writer. Poses
//! and local states are applied in the order the pipeline receives them: a
//! frame is always matched against the last pose that preceded it.

use silo_middleware::{EventBus, QueueSender, Topic};
use silo_perception::GlobalSiloMatcher;
use silo_types::{EventPayload, Pose, SiloArray};

use crate::node::NodeOutputs;

pub struct MatcherNode {
    matcher: GlobalSiloMatcher,
    outputs: NodeOutputs,
}

impl MatcherNode {
    pub fn new(matcher: GlobalSiloMatcher, bus: &EventBus, sink: Option<QueueSender>) -> Self {
        Self {
            matcher,
            outputs: NodeOutputs::new(bus, "matcher", Topic::StateMap, sink),
        }
    }

    pub fn matcher(&self) -> &GlobalSiloMatcher {
        &self.matcher
    }

    /// Replace the pose; an invalid one is reported as a fault and ignored.
    pub async fn on_pose(&mut self, pose: &Pose) {
        if let Err(e) = self.matcher.on_pose(pose) {
            self.outputs.fault(&e).await;
        }
    }

    /// Re-index `local` against the world model and publish the result.
    pub async fn on_local(&self, local: &SiloArray) {
        match self.matcher.match_silos(local) {
            Ok(outcome) => self.outputs.publish(EventPayload::StateMap(outcome.silos)).await,
            Err(e) => self.outputs.fault(&e).await,
        }
    }
}
