//! Global Silo Matcher.
//!
//! Re-indexes silos seen in the image against the fixed [`SiloWorldModel`].
//! On every call the model is projected into the image with the latest robot
//! pose:
//!
//! ```text
//! p_pixel = K · (T_cam_base · T_base_map · p_map)
//! ```
//!
//! and each local silo box takes the index of the first projected silo
//! (in global-index order) whose IoU with it exceeds the accept threshold.
//!
//! The matcher is *not ready* until [`GlobalSiloMatcher::on_pose`] has been
//! called once; until then [`GlobalSiloMatcher::match_silos`] rejects every
//! request with [`SiloError::PoseUnavailable`].

use serde::{Deserialize, Serialize};
use silo_types::{BoundingBoxXyxy, Pose, Silo, SiloArray, SiloError, UNMATCHED_SILO_INDEX};
use tracing::{debug, warn};

use crate::iou::iou;
use crate::transform::{CameraIntrinsics, RigidTransform};
use crate::world_model::{ProjectedSilo, SiloGeometry, SiloRoi, SiloWorldModel};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Field geometry and camera calibration for [`GlobalSiloMatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Map-frame Y offset of every silo, in global-index order.
    pub silos_x: Vec<f64>,
    /// Map-frame X of the silo line.
    pub silo_y: f64,
    pub silo_z_min: f64,
    pub silo_z_max: f64,
    /// Half width of a silo (metres).
    pub silo_radius: f64,
    /// Camera position in the robot base frame.
    pub translation: [f64; 3],
    /// Camera orientation in the robot base frame, `[yaw, pitch, roll]` in
    /// degrees (intrinsic Z-Y-X).
    pub ypr: [f64; 3],
    /// Camera matrix, row-major.
    pub k: [f64; 9],
    /// IoU a projection must exceed to be accepted.
    pub iou_threshold: f64,
    pub max_silos: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            silos_x: Vec::new(),
            silo_y: 0.0,
            silo_z_min: 0.0,
            silo_z_max: 0.0,
            silo_radius: 0.0,
            translation: [0.0; 3],
            ypr: [0.0; 3],
            k: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            iou_threshold: 0.5,
            max_silos: 5,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Result of matching one local silo-state message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome {
    /// One record per local silo, in input order, carrying the global index.
    pub silos: SiloArray,
    /// Low-confidence overlaps, unmatched silos and skipped projections.
    pub warnings: Vec<SiloError>,
}

// ────────────────────────────────────────────────────────────────────────────
// GlobalSiloMatcher
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GlobalSiloMatcher {
    world_model: SiloWorldModel,
    camera_from_base: RigidTransform,
    intrinsics: CameraIntrinsics,
    iou_threshold: f64,
    /// Latest pose as T_base_map; `None` until the first pose arrives.
    base_from_map: Option<RigidTransform>,
}

impl GlobalSiloMatcher {
    /// Build the matcher from its static configuration.
    ///
    /// # Errors
    ///
    /// [`SiloError::Config`] for an invalid world model, a singular camera
    /// matrix or non-finite extrinsics.
    pub fn new(config: &MatcherConfig) -> Result<Self, SiloError> {
        let world_model = SiloWorldModel::new(
            &config.silos_x,
            SiloGeometry {
                silo_y: config.silo_y,
                z_min: config.silo_z_min,
                z_max: config.silo_z_max,
                radius: config.silo_radius,
            },
            config.max_silos,
        )?;

        if !config.translation.iter().chain(&config.ypr).all(|v| v.is_finite()) {
            return Err(SiloError::Config(
                "camera extrinsic contains non-finite values".to_string(),
            ));
        }
        let base_from_camera =
            RigidTransform::from_translation_ypr_degrees(config.translation, config.ypr);
        let intrinsics = CameraIntrinsics::from_row_major(config.k)?;

        debug!(silos = world_model.len(), "silo world model loaded");

        Ok(Self {
            world_model,
            camera_from_base: base_from_camera.inverse(),
            intrinsics,
            iou_threshold: config.iou_threshold,
            base_from_map: None,
        })
    }

    pub fn world_model(&self) -> &SiloWorldModel {
        &self.world_model
    }

    /// Whether a pose has been received.
    pub fn is_ready(&self) -> bool {
        self.base_from_map.is_some()
    }

    /// Replace the latest robot pose.
    ///
    /// # Errors
    ///
    /// [`SiloError::InvalidPose`] for a zero or non-finite orientation; the
    /// previously held pose is kept.
    pub fn on_pose(&mut self, pose: &Pose) -> Result<(), SiloError> {
        let p = pose.position;
        let q = pose.orientation;
        let map_from_base =
            RigidTransform::from_translation_quaternion([p.x, p.y, p.z], [q.x, q.y, q.z, q.w])?;
        self.base_from_map = Some(map_from_base.inverse());
        Ok(())
    }

    /// Project every world-model silo into the current image.
    ///
    /// Entries whose projection is degenerate are logged and left out.
    ///
    /// # Errors
    ///
    /// [`SiloError::PoseUnavailable`] before the first pose.
    pub fn project_world_model(&self) -> Result<Vec<ProjectedSilo>, SiloError> {
        let base_from_map = self.base_from_map.ok_or(SiloError::PoseUnavailable)?;
        Ok(self.project_all(&base_from_map, &mut Vec::new()))
    }

    /// Assign global indices to the silos of a local silo-state message.
    ///
    /// # Errors
    ///
    /// [`SiloError::PoseUnavailable`] before the first pose; nothing is
    /// produced in that case.
    pub fn match_silos(&self, local: &SiloArray) -> Result<MatchOutcome, SiloError> {
        let Some(base_from_map) = self.base_from_map else {
            warn!("Base link pose not received yet");
            return Err(SiloError::PoseUnavailable);
        };

        let mut warnings = Vec::new();
        let projected = self.project_all(&base_from_map, &mut warnings);

        let silos = local
            .silos
            .iter()
            .enumerate()
            .map(|(i, silo)| {
                let index = self.match_one(i + 1, &silo.xyxy, &projected, &mut warnings);
                Silo {
                    index,
                    state: silo.state.clone(),
                    xyxy: silo.xyxy,
                }
            })
            .collect();

        Ok(MatchOutcome {
            silos: SiloArray { silos },
            warnings,
        })
    }

    /// Linear scan in global-index order; the first accepted overlap wins.
    fn match_one(
        &self,
        local: usize,
        bbox: &BoundingBoxXyxy,
        projected: &[ProjectedSilo],
        warnings: &mut Vec<SiloError>,
    ) -> u8 {
        for candidate in projected {
            let overlap = iou(bbox, &candidate.bbox);
            if overlap == 0.0 {
                continue;
            }
            if overlap > self.iou_threshold {
                return candidate.index;
            }
            warn!(
                local,
                global = candidate.index,
                iou = overlap,
                "Silo has low IoU with projected silo"
            );
            warnings.push(SiloError::LowConfidenceMatch {
                local,
                global: candidate.index,
                iou: overlap,
            });
        }

        warn!(local, "Silo not found in the map");
        warnings.push(SiloError::UnmatchedSilo { local });
        UNMATCHED_SILO_INDEX
    }

    fn project_all(
        &self,
        base_from_map: &RigidTransform,
        warnings: &mut Vec<SiloError>,
    ) -> Vec<ProjectedSilo> {
        let camera_from_map = self.camera_from_base.compose(base_from_map);
        self.world_model
            .entries()
            .iter()
            .filter_map(|roi| match self.project_roi(&camera_from_map, roi) {
                Ok(projected) => Some(projected),
                Err(e) => {
                    warn!(silo = roi.index, error = %e, "Skipping silo projection");
                    warnings.push(e);
                    None
                }
            })
            .collect()
    }

    fn project_roi(
        &self,
        camera_from_map: &RigidTransform,
        roi: &SiloRoi,
    ) -> Result<ProjectedSilo, SiloError> {
        let top_left = self
            .intrinsics
            .project(&camera_from_map.transform_point(&roi.top_left)?)?;
        let bottom_right = self
            .intrinsics
            .project(&camera_from_map.transform_point(&roi.bottom_right)?)?;
        Ok(ProjectedSilo {
            index: roi.index,
            bbox: BoundingBoxXyxy::from_corners(
                (top_left.x, top_left.y),
                (bottom_right.x, bottom_right.y),
            ),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use silo_types::{Orientation, Position};

    /// Camera at the base origin, optical axis along base +X, image X along
    /// base −Y, image Y along base −Z.
    fn config() -> MatcherConfig {
        MatcherConfig {
            silos_x: vec![-1.0, 0.0, 1.0],
            silo_y: 4.0,
            silo_z_min: -0.5,
            silo_z_max: 0.5,
            silo_radius: 0.25,
            translation: [0.0; 3],
            ypr: [-90.0, 0.0, -90.0],
            k: [400.0, 0.0, 460.0, 0.0, 400.0, 259.0, 0.0, 0.0, 1.0],
            ..MatcherConfig::default()
        }
    }

    fn origin_pose() -> Pose {
        Pose::default()
    }

    fn local(boxes: &[BoundingBoxXyxy]) -> SiloArray {
        SiloArray {
            silos: boxes
                .iter()
                .enumerate()
                .map(|(i, b)| Silo {
                    index: (i + 1) as u8,
                    state: "RB".to_string(),
                    xyxy: *b,
                })
                .collect(),
        }
    }

    fn ready_matcher() -> GlobalSiloMatcher {
        let mut m = GlobalSiloMatcher::new(&config()).unwrap();
        m.on_pose(&origin_pose()).unwrap();
        m
    }

    #[test]
    fn not_ready_before_first_pose() {
        let m = GlobalSiloMatcher::new(&config()).unwrap();
        assert!(!m.is_ready());
        assert_eq!(
            m.match_silos(&local(&[BoundingBoxXyxy::new(0.0, 0.0, 10.0, 10.0)])),
            Err(SiloError::PoseUnavailable)
        );
        assert_eq!(m.project_world_model(), Err(SiloError::PoseUnavailable));
    }

    #[test]
    fn projection_from_origin() {
        let projected = ready_matcher().project_world_model().unwrap();
        assert_eq!(projected.len(), 3);

        // Middle silo straight ahead: u = 460 ∓ 400·0.25/4, v = 259 ∓ 400·0.5/4.
        let mid = projected[1];
        assert_eq!(mid.index, 2);
        assert!((mid.bbox.x_min - 435.0).abs() < 1e-9);
        assert!((mid.bbox.x_max - 485.0).abs() < 1e-9);
        assert!((mid.bbox.y_min - 209.0).abs() < 1e-9);
        assert!((mid.bbox.y_max - 309.0).abs() < 1e-9);

        // Map +Y is image left, so silo 1 (offset −1) is on the right.
        assert!(projected[0].bbox.x_min > mid.bbox.x_max);
        assert!(projected[2].bbox.x_max < mid.bbox.x_min);
    }

    #[test]
    fn exact_projection_matches_its_index() {
        let m = ready_matcher();
        let projected = m.project_world_model().unwrap();
        let boxes: Vec<BoundingBoxXyxy> = projected.iter().rev().map(|p| p.bbox).collect();
        let outcome = m.match_silos(&local(&boxes)).unwrap();
        let indices: Vec<u8> = outcome.silos.silos.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![3, 2, 1]);
        assert!(outcome.warnings.is_empty());
        assert!(outcome.silos.silos.iter().all(|s| s.state == "RB"));
        assert_eq!(outcome.silos.silos[0].xyxy, boxes[0]);
    }

    #[test]
    fn disjoint_detection_is_unmatched() {
        let outcome = ready_matcher()
            .match_silos(&local(&[BoundingBoxXyxy::new(0.0, 0.0, 20.0, 20.0)]))
            .unwrap();
        assert_eq!(outcome.silos.silos[0].index, UNMATCHED_SILO_INDEX);
        assert_eq!(outcome.warnings, vec![SiloError::UnmatchedSilo { local: 1 }]);
    }

    #[test]
    fn low_overlap_warns_and_falls_through() {
        // Left 40 % of the middle silo only.
        let half = BoundingBoxXyxy::new(435.0, 209.0, 455.0, 309.0);
        let outcome = ready_matcher().match_silos(&local(&[half])).unwrap();
        assert_eq!(outcome.silos.silos[0].index, UNMATCHED_SILO_INDEX);
        assert!(matches!(
            outcome.warnings[0],
            SiloError::LowConfidenceMatch { local: 1, global: 2, .. }
        ));
        assert_eq!(outcome.warnings[1], SiloError::UnmatchedSilo { local: 1 });
    }

    #[test]
    fn low_overlap_before_accepted_match_keeps_scanning() {
        // Silos 10 px apart: silo 1 spans u 495..545, silo 2 spans 435..485.
        let cfg = MatcherConfig {
            silos_x: vec![-0.6, 0.0, 0.6],
            ..config()
        };
        let mut m = GlobalSiloMatcher::new(&cfg).unwrap();
        m.on_pose(&origin_pose()).unwrap();

        let wide = BoundingBoxXyxy::new(435.0, 209.0, 497.0, 309.0);
        let outcome = m.match_silos(&local(&[wide])).unwrap();
        assert_eq!(outcome.silos.silos[0].index, 2);
        assert!(matches!(
            outcome.warnings.as_slice(),
            [SiloError::LowConfidenceMatch { local: 1, global: 1, .. }]
        ));
    }

    #[test]
    fn pose_moves_the_projection() {
        let mut m = ready_matcher();
        // Step 1 m along map +Y: silo 3 (offset +1) is now straight ahead.
        m.on_pose(&Pose {
            position: Position {
                x: 0.0,
                y: 1.0,
                z: 0.0,
            },
            orientation: Orientation::default(),
        })
        .unwrap();
        let centre = BoundingBoxXyxy::new(435.0, 209.0, 485.0, 309.0);
        let outcome = m.match_silos(&local(&[centre])).unwrap();
        assert_eq!(outcome.silos.silos[0].index, 3);
    }

    #[test]
    fn invalid_pose_keeps_previous_state() {
        let mut m = ready_matcher();
        let bad = Pose {
            orientation: Orientation {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 0.0,
            },
            ..Pose::default()
        };
        assert!(matches!(m.on_pose(&bad), Err(SiloError::InvalidPose(_))));
        assert!(m.is_ready());
        assert_eq!(m.project_world_model().unwrap().len(), 3);
    }

    #[test]
    fn silo_behind_camera_plane_is_skipped() {
        // Silo line through the camera centre: every corner has depth 0.
        let cfg = MatcherConfig {
            silo_y: 0.0,
            ..config()
        };
        let mut m = GlobalSiloMatcher::new(&cfg).unwrap();
        m.on_pose(&origin_pose()).unwrap();
        assert!(m.project_world_model().unwrap().is_empty());

        let outcome = m
            .match_silos(&local(&[BoundingBoxXyxy::new(0.0, 0.0, 10.0, 10.0)]))
            .unwrap();
        assert_eq!(outcome.warnings.len(), 4);
        assert!(matches!(outcome.warnings[0], SiloError::DegenerateProjection { .. }));
        assert_eq!(outcome.silos.silos[0].index, UNMATCHED_SILO_INDEX);
    }

    #[test]
    fn silos_behind_the_robot_are_not_projected() {
        let mut m = ready_matcher();
        // Yaw 180°: the silo line is now behind the camera.
        m.on_pose(&Pose {
            orientation: Orientation {
                x: 0.0,
                y: 0.0,
                z: 1.0,
                w: 0.0,
            },
            ..Pose::default()
        })
        .unwrap();
        assert!(m.project_world_model().unwrap().is_empty());

        // Where silo 2 would land if mirrored through the camera centre.
        let mirrored = BoundingBoxXyxy::new(435.0, 209.0, 485.0, 309.0);
        let outcome = m.match_silos(&local(&[mirrored])).unwrap();
        assert_eq!(outcome.silos.silos[0].index, UNMATCHED_SILO_INDEX);
        assert!(outcome
            .warnings
            .iter()
            .take(3)
            .all(|w| matches!(w, SiloError::DegenerateProjection { divisor } if *divisor < 0.0)));
        assert_eq!(outcome.warnings[3], SiloError::UnmatchedSilo { local: 1 });
    }

    #[test]
    fn empty_local_message_gives_empty_output() {
        let outcome = ready_matcher().match_silos(&SiloArray::default()).unwrap();
        assert!(outcome.silos.silos.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn singular_camera_matrix_rejected() {
        let cfg = MatcherConfig {
            k: [0.0; 9],
            ..config()
        };
        assert!(matches!(GlobalSiloMatcher::new(&cfg), Err(SiloError::Config(_))));
    }

    #[test]
    fn config_from_toml() {
        let raw = r#"
            silos_x = [-1.0, 0.0, 1.0]
            silo_y = 5.9
            k = [600.0, 0.0, 460.0, 0.0, 600.0, 259.0, 0.0, 0.0, 1.0]
        "#;
        let cfg: MatcherConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.silos_x.len(), 3);
        assert_eq!(cfg.iou_threshold, 0.5);
        assert!(GlobalSiloMatcher::new(&cfg).is_ok());
    }
}
