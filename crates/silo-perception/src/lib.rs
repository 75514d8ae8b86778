//! `silo-perception` – the silo reasoning layer.
//!
//! Turns per-frame detections and the robot pose into silo contents tagged
//! with a stable field index.
//!
//! # Modules
//!
//! - [`estimator`] – [`SiloStateEstimator`]: assigns balls to silos within
//!   one image and encodes each silo's contents bottom to top.
//! - [`matcher`] – [`GlobalSiloMatcher`]: projects the field's silo model
//!   into the image and re-indexes local silos by IoU.
//! - [`world_model`] – [`SiloWorldModel`]: the fixed 3-D silo regions.
//! - [`transform`] – rigid transforms and pinhole projection on `nalgebra`.
//! - [`iou`] – box intersection and Intersection-over-Union.

pub mod estimator;
pub mod iou;
pub mod matcher;
pub mod transform;
pub mod world_model;

pub use estimator::{EstimatorConfig, SiloEstimate, SiloStateEstimator};
pub use matcher::{GlobalSiloMatcher, MatchOutcome, MatcherConfig};
pub use world_model::{ProjectedSilo, SiloRoi, SiloWorldModel};
