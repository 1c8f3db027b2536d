//! Antenna coordinate systems (ACCS) attached to body cylinders.

use std::collections::BTreeMap;

use nalgebra::{Matrix3x4, Point3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cylinder::{endpoints, CylinderBasis, CylinderFrames};
use crate::error::{BodyError, BodyResult};
use crate::skeleton::{CylinderId, MarkerId, SkeletonGraph};

/// Static placement of an antenna on a cylinder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaMount {
    pub cylinder: CylinderId,

    /// Offset from the tail along the cylinder axis (m)
    pub length: f64,

    /// Radial offset from the axis (m)
    pub height: f64,

    /// Roll about the cylinder axis, from the lateral direction (rad)
    pub angle: f64,

    /// Antenna pattern file, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Mount descriptors keyed by antenna id.
pub type AntennaMounts = BTreeMap<String, AntennaMount>;

/// World-space frame of one mounted antenna.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntennaFrame {
    pub origin: Point3<f64>,

    /// Cylinder basis rolled by the mount angle
    pub basis: CylinderBasis,

    /// Current tail-to-head length of the carrying cylinder
    pub segment_length: f64,
}

impl AntennaFrame {
    /// `[origin | axis lateral normal]`
    pub fn to_homogeneous(&self) -> Matrix3x4<f64> {
        Matrix3x4::from_columns(&[
            self.origin.coords,
            self.basis.axis,
            self.basis.lateral,
            self.basis.normal,
        ])
    }
}

/// Derives every antenna frame from the current cylinder bases.
///
/// `positions` must be the marker positions the bases were computed from.
/// Nothing is cached: call again after any topos or basis change.
pub fn derive_antenna_frames(
    skeleton: &SkeletonGraph,
    mounts: &AntennaMounts,
    frames: &CylinderFrames,
    positions: &[Point3<f64>],
    column_of: impl Fn(MarkerId) -> Option<usize>,
) -> BodyResult<BTreeMap<String, AntennaFrame>> {
    let mut out = BTreeMap::new();
    for (key, mount) in mounts {
        let cylinder = skeleton
            .cylinder(mount.cylinder)
            .ok_or(BodyError::UnknownCylinder(mount.cylinder))?;
        let basis = frames
            .get(mount.cylinder)
            .ok_or(BodyError::UnknownCylinder(mount.cylinder))?;
        let (tail, head) = endpoints(positions, &column_of, cylinder.tail, cylinder.head)?;
        let segment_length = (head - tail).norm();

        if mount.length > segment_length {
            debug!(
                "Antenna {} sits {:.3} m along a {:.3} m cylinder",
                key, mount.length, segment_length
            );
        }

        let rolled = basis.rotated_about_axis(mount.angle);
        let origin = tail + rolled.axis * mount.length + rolled.lateral * mount.height;
        out.insert(
            key.clone(),
            AntennaFrame {
                origin,
                basis: rolled,
                segment_length,
            },
        );
    }
    Ok(out)
}

/// Ad hoc point on a cylinder surface, unrelated to the declared mounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    pub cylinder: CylinderId,
    pub position: Point3<f64>,
}

impl SurfacePoint {
    /// Point at the cylinder radius, `length` along the axis from the tail
    /// and `angle` around it from the lateral direction.
    pub fn on_cylinder(
        cylinder: CylinderId,
        tail: &Point3<f64>,
        basis: &CylinderBasis,
        radius: f64,
        length: f64,
        angle: f64,
    ) -> Self {
        let (s, c) = angle.sin_cos();
        let position =
            tail + basis.lateral * (radius * c) + basis.normal * (radius * s) + basis.axis * length;
        Self { cylinder, position }
    }
}
