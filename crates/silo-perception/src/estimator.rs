//! Silo State Estimator.
//!
//! Turns one frame of detections into the contents of every visible silo:
//!
//! 1. Split detections into silos and balls (ignored classes are dropped).
//! 2. Order silos by image X: left to right for the blue team, right to left
//!    for the red team.
//! 3. Assign each ball to the first silo whose tolerance-expanded box holds
//!    it. List order decides ties, not fit quality.
//! 4. Order each silo's balls bottom to top (image Y descending), cap them at
//!    the silo capacity and encode them as a string over `{R, B}`.
//!
//! # Example
//!
//! ```rust
//! use silo_perception::estimator::{EstimatorConfig, SiloStateEstimator};
//! use silo_types::{BoundingBox2D, Detection, TeamColor};
//!
//! let estimator = SiloStateEstimator::new(EstimatorConfig::default());
//! let frame = vec![
//!     Detection::new("silo", BoundingBox2D::new(100.0, 60.0, 50.0, 50.0)),
//!     Detection::new("red-ball", BoundingBox2D::new(100.0, 70.0, 20.0, 20.0)),
//! ];
//! let estimate = estimator.estimate(&frame, TeamColor::Blue).unwrap();
//! assert_eq!(estimate.silos.silos[0].state, "R");
//! ```

use serde::{Deserialize, Serialize};
use silo_types::{BoundingBoxXyxy, ClassLabel, Detection, Silo, SiloArray, SiloError, TeamColor};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Thresholds and field constants for [`SiloStateEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub team_color: TeamColor,
    /// Image width in pixels.
    pub image_width: u32,
    /// Image height in pixels.
    pub image_height: u32,
    /// Horizontal slack around a silo, as a fraction of the image width.
    pub tolerance: f64,
    /// Pixels above a silo box in which a ball still counts as inside.
    pub margin_above: f64,
    /// Pixels below a silo box in which a ball still counts as inside.
    pub margin_below: f64,
    /// More silo detections than this drops the frame.
    pub max_silos: usize,
    /// Balls a silo can physically hold.
    pub silo_capacity: usize,
    /// Class names that are neither silos nor balls.
    pub ignored_classes: Vec<String>,
    /// Silo detections with an area at or below this are discarded.
    pub min_silo_area: Option<f64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            team_color: TeamColor::Blue,
            image_width: 921,
            image_height: 518,
            tolerance: 0.05,
            margin_above: 100.0,
            margin_below: 10.0,
            max_silos: 5,
            silo_capacity: 3,
            ignored_classes: vec!["purple".to_string(), "purple-ball".to_string()],
            min_silo_area: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Result of one processed frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiloEstimate {
    /// One record per silo, `index` = rank in the frame (1-based).
    pub silos: SiloArray,
    /// Non-fatal conditions hit while processing the frame.
    pub warnings: Vec<SiloError>,
}

// ────────────────────────────────────────────────────────────────────────────
// SiloStateEstimator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SiloStateEstimator {
    config: EstimatorConfig,
}

impl SiloStateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the state of every silo visible in `detections`.
    ///
    /// # Errors
    ///
    /// [`SiloError::TooManySilos`] when the frame holds more silo detections
    /// than `max_silos`. The frame is discarded and nothing is produced.
    pub fn estimate(
        &self,
        detections: &[Detection],
        team_color: TeamColor,
    ) -> Result<SiloEstimate, SiloError> {
        let (mut silos, balls) = self.separate_detections(detections);

        if silos.len() > self.config.max_silos {
            warn!(
                silos = silos.len(),
                max = self.config.max_silos,
                "Too many silos detected"
            );
            return Err(SiloError::TooManySilos {
                count: silos.len(),
                max: self.config.max_silos,
            });
        }

        match team_color {
            TeamColor::Blue => {
                silos.sort_by(|a, b| a.bbox.center_x.total_cmp(&b.bbox.center_x));
            }
            TeamColor::Red => {
                silos.sort_by(|a, b| b.bbox.center_x.total_cmp(&a.bbox.center_x));
            }
        }

        let silo_boxes: Vec<BoundingBoxXyxy> =
            silos.iter().map(|s| s.bbox.to_pixel_xyxy()).collect();

        let mut contents: Vec<Vec<&Detection>> = vec![Vec::new(); silos.len()];
        for ball in balls {
            let ball_box = ball.bbox.to_pixel_xyxy();
            if let Some(slot) = silo_boxes.iter().position(|s| self.contains(s, &ball_box)) {
                contents[slot].push(ball);
            }
        }

        let mut warnings = Vec::new();
        for (i, balls) in contents.iter_mut().enumerate() {
            balls.sort_by(|a, b| b.bbox.center_y.total_cmp(&a.bbox.center_y));
            if balls.len() > self.config.silo_capacity {
                warn!(
                    silo = i + 1,
                    balls = balls.len(),
                    capacity = self.config.silo_capacity,
                    "Too many balls detected in silo"
                );
                warnings.push(SiloError::SiloOverflow {
                    silo: i + 1,
                    count: balls.len(),
                    capacity: self.config.silo_capacity,
                });
                balls.truncate(self.config.silo_capacity);
            }
        }

        let silos: Vec<Silo> = contents
            .iter()
            .zip(silo_boxes)
            .enumerate()
            .map(|(i, (balls, xyxy))| Silo {
                // max_silos is a handful; the rank always fits.
                index: u8::try_from(i + 1).unwrap_or(u8::MAX),
                state: encode_state(balls),
                xyxy,
            })
            .collect();

        debug!(team = %team_color, state = %summarize(&silos), "silo state");

        Ok(SiloEstimate {
            silos: SiloArray { silos },
            warnings,
        })
    }

    fn separate_detections<'a>(
        &self,
        detections: &'a [Detection],
    ) -> (Vec<&'a Detection>, Vec<&'a Detection>) {
        let mut silos = Vec::new();
        let mut balls = Vec::new();
        for detection in detections {
            match detection.label() {
                ClassLabel::Silo => {
                    if self.passes_area_filter(detection) {
                        silos.push(detection);
                    }
                }
                _ if self.is_ignored(&detection.class_name) => {}
                _ => balls.push(detection),
            }
        }
        (silos, balls)
    }

    fn is_ignored(&self, class_name: &str) -> bool {
        self.config.ignored_classes.iter().any(|c| c == class_name)
    }

    fn passes_area_filter(&self, silo: &Detection) -> bool {
        match self.config.min_silo_area {
            Some(min) => {
                let px = silo.bbox.to_pixel_xyxy();
                px.width() * px.height() > min
            }
            None => true,
        }
    }

    /// Whether `ball` lies inside the tolerance-expanded `silo` box, clamped
    /// to the image.
    fn contains(&self, silo: &BoundingBoxXyxy, ball: &BoundingBoxXyxy) -> bool {
        let width = f64::from(self.config.image_width);
        let height = f64::from(self.config.image_height);
        let slack = self.config.tolerance * width;

        ball.x_min >= (silo.x_min - slack).max(0.0)
            && ball.x_max <= (silo.x_max + slack).min(width)
            && ball.y_min >= (silo.y_min - self.config.margin_above).max(0.0)
            && ball.y_max <= (silo.y_max + self.config.margin_below).min(height)
    }
}

/// Encode balls (already ordered bottom to top) as a state string.
///
/// Balls whose class has no symbol are skipped.
pub fn encode_state(balls: &[&Detection]) -> String {
    balls.iter().filter_map(|b| b.label().symbol()).collect()
}

fn summarize(silos: &[Silo]) -> String {
    silos
        .iter()
        .map(|s| format!("Silo{}: {}", s.index, s.state))
        .collect::<Vec<_>>()
        .join(" | ")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
