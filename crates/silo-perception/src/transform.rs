//! Rigid-body transforms and pinhole projection.
//!
//! Points travel through the chain `map → base_link → camera → pixel`:
//!
//! * [`RigidTransform`] is a 4×4 homogeneous matrix. Points are transformed
//!   by appending `1`, multiplying and dividing by the last coordinate.
//! * [`CameraIntrinsics`] holds the 3×3 matrix `K` and maps a camera-frame
//!   point (Z = depth) to a pixel.
//!
//! Every division is guarded: a divisor whose magnitude is below
//! [`DEGENERATE_EPSILON`] yields [`SiloError::DegenerateProjection`]. A point
//! at or behind the camera plane has no image and is rejected the same way.
//!
//! # Example
//!
//! ```rust
//! use silo_perception::transform::{CameraIntrinsics, Point3, RigidTransform};
//!
//! // Camera 1 m in front of the map origin, looking along +Z.
//! let camera_from_map = RigidTransform::from_translation_ypr_degrees([0.0, 0.0, 1.0], [0.0; 3]);
//! let k = CameraIntrinsics::from_row_major([500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0]).unwrap();
//!
//! let p_cam = camera_from_map.transform_point(&Point3::new(0.0, 0.0, 1.0)).unwrap();
//! let px = k.project(&p_cam).unwrap();
//! assert!((px.x - 320.0).abs() < 1e-9);
//! ```

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3, Vector4};
use silo_types::SiloError;

pub use nalgebra::{Point2, Point3};

/// Smallest homogeneous divisor accepted before a projection is declared
/// degenerate.
pub const DEGENERATE_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// RigidTransform
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform stored as a 4×4 homogeneous matrix.
///
/// `T_a_b` maps points expressed in frame `b` into frame `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    matrix: Matrix4<f64>,
}

impl RigidTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Build from a rotation and a translation (rotation applied first).
    pub fn from_parts(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        let mut matrix = rotation.to_homogeneous();
        matrix[(0, 3)] = translation.x;
        matrix[(1, 3)] = translation.y;
        matrix[(2, 3)] = translation.z;
        Self { matrix }
    }

    /// Build from a translation and an orientation quaternion given in
    /// `(x, y, z, w)` order.
    ///
    /// The quaternion is normalised; a (near) zero quaternion is rejected
    /// with [`SiloError::InvalidPose`].
    pub fn from_translation_quaternion(
        translation: [f64; 3],
        quaternion_xyzw: [f64; 4],
    ) -> Result<Self, SiloError> {
        let [x, y, z, w] = quaternion_xyzw;
        if !quaternion_xyzw.iter().chain(translation.iter()).all(|v| v.is_finite()) {
            return Err(SiloError::InvalidPose("non-finite pose component".to_string()));
        }
        let rotation = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), DEGENERATE_EPSILON)
            .ok_or_else(|| SiloError::InvalidPose("zero-norm orientation quaternion".to_string()))?;
        Ok(Self::from_parts(
            rotation.to_rotation_matrix(),
            Vector3::from(translation),
        ))
    }

    /// Build from a translation and intrinsic Z-Y-X Euler angles
    /// `[yaw, pitch, roll]` in degrees, i.e. `R = Rz(yaw)·Ry(pitch)·Rx(roll)`.
    pub fn from_translation_ypr_degrees(translation: [f64; 3], ypr_degrees: [f64; 3]) -> Self {
        let [yaw, pitch, roll] = ypr_degrees.map(f64::to_radians);
        Self::from_parts(
            Rotation3::from_euler_angles(roll, pitch, yaw),
            Vector3::from(translation),
        )
    }

    /// The underlying homogeneous matrix.
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Compose two transforms.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// The exact inverse `[Rᵀ | −Rᵀt]`.
    pub fn inverse(&self) -> Self {
        let rt = self.rotation().transpose();
        let t = -(rt * self.translation());
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&rt);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        Self { matrix }
    }

    /// Transform a point through homogeneous coordinates.
    pub fn transform_point(&self, point: &Point3<f64>) -> Result<Point3<f64>, SiloError> {
        let h = self.matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        let w = checked_divisor(h.w)?;
        Ok(Point3::new(h.x / w, h.y / w, h.z / w))
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CameraIntrinsics
// ────────────────────────────────────────────────────────────────────────────

/// Pinhole camera matrix `K`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    k: Matrix3<f64>,
    k_inv: Matrix3<f64>,
}

impl CameraIntrinsics {
    /// Build from the nine entries of `K` in row-major order.
    ///
    /// # Errors
    ///
    /// [`SiloError::Config`] when `K` is not invertible.
    pub fn from_row_major(k: [f64; 9]) -> Result<Self, SiloError> {
        let k = Matrix3::from_row_slice(&k);
        let k_inv = k
            .try_inverse()
            .ok_or_else(|| SiloError::Config("camera matrix is singular".to_string()))?;
        Ok(Self { k, k_inv })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.k
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// The depth must be positive; otherwise the division would mirror the
    /// point into the image.
    pub fn project(&self, point: &Point3<f64>) -> Result<Point2<f64>, SiloError> {
        let h = self.k * point.coords;
        let depth = checked_divisor(h.z)?;
        if depth < 0.0 {
            return Err(SiloError::DegenerateProjection { divisor: depth });
        }
        Ok(Point2::new(h.x / depth, h.y / depth))
    }

    /// Back-project a pixel at the given depth (camera Z) into the camera
    /// frame.
    pub fn unproject(&self, pixel: &Point2<f64>, depth: f64) -> Point3<f64> {
        let ray = self.k_inv * Vector3::new(pixel.x, pixel.y, 1.0);
        Point3::from(ray * (depth / ray.z))
    }
}

fn checked_divisor(divisor: f64) -> Result<f64, SiloError> {
    if !divisor.is_finite() || divisor.abs() < DEGENERATE_EPSILON {
        return Err(SiloError::DegenerateProjection { divisor });
    }
    Ok(divisor)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
