//! Static 3-D model of the silo regions on the field.
//!
//! Each silo is a vertical slab described by two opposite corners in the map
//! frame. Silos sit on a line at map X = `silo_y`, spread along map Y by
//! their per-silo offset, and span `silo_z_min..silo_z_max` in height:
//!
//! ```text
//! top_left     = (silo_y, offset + radius, z_max)
//! bottom_right = (silo_y, offset - radius, z_min)
//! ```
//!
//! Global indices are assigned 1..N in the order the offsets are configured
//! and never change afterwards.

use silo_types::{BoundingBoxXyxy, SiloError};

use crate::transform::Point3;

/// Region of one physical silo in the map frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiloRoi {
    /// Global index, 1-based.
    pub index: u8,
    pub top_left: Point3<f64>,
    pub bottom_right: Point3<f64>,
}

/// A [`SiloRoi`] projected into the current image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedSilo {
    pub index: u8,
    pub bbox: BoundingBoxXyxy,
}

/// Field geometry shared by every silo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiloGeometry {
    pub silo_y: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub radius: f64,
}

/// The fixed set of silo regions, in global-index order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiloWorldModel {
    entries: Vec<SiloRoi>,
}

impl SiloWorldModel {
    /// Build the model from per-silo offsets.
    ///
    /// # Errors
    ///
    /// [`SiloError::Config`] when more than `max_silos` offsets are given,
    /// when `max_silos` does not fit a silo index, or when a value is not
    /// finite.
    pub fn new(offsets: &[f64], geometry: SiloGeometry, max_silos: usize) -> Result<Self, SiloError> {
        if offsets.len() > max_silos {
            return Err(SiloError::Config(format!(
                "{} silo offsets configured, at most {} allowed",
                offsets.len(),
                max_silos
            )));
        }
        if max_silos >= usize::from(silo_types::UNMATCHED_SILO_INDEX) {
            return Err(SiloError::Config(format!(
                "max_silos {max_silos} collides with the unmatched index"
            )));
        }
        let finite = [geometry.silo_y, geometry.z_min, geometry.z_max, geometry.radius]
            .iter()
            .chain(offsets)
            .all(|v| v.is_finite());
        if !finite {
            return Err(SiloError::Config("silo geometry contains non-finite values".to_string()));
        }

        let entries = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| SiloRoi {
                // Bounded by the max_silos check above.
                index: (i + 1) as u8,
                top_left: Point3::new(geometry.silo_y, offset + geometry.radius, geometry.z_max),
                bottom_right: Point3::new(geometry.silo_y, offset - geometry.radius, geometry.z_min),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SiloRoi] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
