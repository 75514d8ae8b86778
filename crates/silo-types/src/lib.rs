use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Index written into a [`Silo`] record when no world-model silo matches it.
pub const UNMATCHED_SILO_INDEX: u8 = 255;

/// Team the robot plays for. Decides which side of the image counts as the
/// first silo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamColor {
    #[default]
    Blue,
    Red,
}

impl std::fmt::Display for TeamColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamColor::Blue => write!(f, "blue"),
            TeamColor::Red => write!(f, "red"),
        }
    }
}

impl std::str::FromStr for TeamColor {
    type Err = SiloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(TeamColor::Blue),
            "red" => Ok(TeamColor::Red),
            other => Err(SiloError::Config(format!("unknown team color '{other}'"))),
        }
    }
}

/// Semantic class of a detection, derived from the tracker's class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassLabel {
    Silo,
    RedBall,
    BlueBall,
    /// Any other class, carrying the raw name.
    Other(String),
}

impl ClassLabel {
    pub fn from_class_name(name: &str) -> Self {
        match name {
            "silo" => ClassLabel::Silo,
            "red" | "red-ball" => ClassLabel::RedBall,
            "blue" | "blue-ball" => ClassLabel::BlueBall,
            other => ClassLabel::Other(other.to_string()),
        }
    }

    /// Symbol used in a silo state string, if this class has one.
    pub fn symbol(&self) -> Option<char> {
        match self {
            ClassLabel::RedBall => Some('R'),
            ClassLabel::BlueBall => Some('B'),
            _ => None,
        }
    }
}

/// Bounding box in center/size form, as emitted by the detector (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox2D {
    pub fn new(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }

    /// Corner form using whole-pixel arithmetic: the center and size are
    /// truncated to integers and the half extent is `trunc(size / 2)`.
    ///
    /// A box of odd size therefore loses one pixel on the far side.
    pub fn to_pixel_xyxy(&self) -> BoundingBoxXyxy {
        let cx = self.center_x.trunc() as i64;
        let cy = self.center_y.trunc() as i64;
        let half_w = (self.width.trunc() as i64) / 2;
        let half_h = (self.height.trunc() as i64) / 2;
        BoundingBoxXyxy::new(
            (cx - half_w) as f64,
            (cy - half_h) as f64,
            (cx + half_w) as f64,
            (cy + half_h) as f64,
        )
    }
}

/// Axis-aligned box in corner form (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBoxXyxy {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBoxXyxy {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build a valid box from two arbitrary opposite corners.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self::new(a.0.min(b.0), a.1.min(b.1), a.0.max(b.0), a.1.max(b.1))
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// One object reported by the detector/tracker for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Raw class name, e.g. `"silo"`, `"red-ball"`.
    pub class_name: String,
    #[serde(default)]
    pub score: f32,
    /// Tracker identity, when the upstream model tracks objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    pub bbox: BoundingBox2D,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, bbox: BoundingBox2D) -> Self {
        Self {
            class_name: class_name.into(),
            score: 1.0,
            track_id: None,
            bbox,
        }
    }

    pub fn label(&self) -> ClassLabel {
        ClassLabel::from_class_name(&self.class_name)
    }
}

/// All detections of one camera frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionArray {
    pub detections: Vec<Detection>,
}

/// A silo record.
///
/// Local records carry the silo's left-to-right rank in the frame; global
/// records carry the world-model index or [`UNMATCHED_SILO_INDEX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silo {
    pub index: u8,
    /// Ball colours from bottom to top, e.g. `"RB"`.
    pub state: String,
    pub xyxy: BoundingBoxXyxy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SiloArray {
    pub silos: Vec<Silo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation quaternion in (x, y, z, w) order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Robot base pose in the map frame. Missing fields default to the origin
/// and the identity orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "silo-runtime::estimator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// One detector frame.
    Detections(DetectionArray),
    /// Latest robot pose in the map frame.
    Odometry(Pose),
    /// Silo states indexed by their rank in the image.
    StateImage(SiloArray),
    /// Silo states indexed by the world model.
    StateMap(SiloArray),
    /// A frame that was rejected or degraded.
    Fault { component: String, message: String },
}

/// Error type for the whole pipeline. Every variant is recoverable: the
/// current frame is dropped, truncated or marked, and processing goes on.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SiloError {
    #[error("Too many silos detected: {count} (max {max})")]
    TooManySilos { count: usize, max: usize },

    #[error("Too many balls detected in silo-{silo}: {count} (capacity {capacity})")]
    SiloOverflow {
        silo: usize,
        count: usize,
        capacity: usize,
    },

    #[error("Base link pose not received yet")]
    PoseUnavailable,

    #[error("Silo-{local} has low IoU with silo-{global}: {iou:.2}")]
    LowConfidenceMatch { local: usize, global: u8, iou: f64 },

    #[error("Silo-{local} not found in the map")]
    UnmatchedSilo { local: usize },

    #[error("Degenerate projection: homogeneous divisor {divisor}")]
    DegenerateProjection { divisor: f64 },

    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel error: {0}")]
    Channel(String),
}
