//! Cylinder coordinate systems (CCS).
//!
//! Each skeleton edge gets an orthonormal, right-handed basis:
//! - `axis` along the segment, tail to head
//! - `lateral` the body velocity with its axial component removed
//! - `normal = axis × lateral`
//!
//! Using the motion direction instead of a fixed world axis to fix the roll
//! keeps the basis meaningful whichever way the body faces on the ground.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BodyError, BodyResult};
use crate::skeleton::{CylinderId, MarkerId, SkeletonGraph};

/// Vectors shorter than this are treated as zero.
pub const DEGENERATE_EPS: f64 = 1e-12;

/// Normalizes `v`, reporting `what` if it has no direction.
pub fn unit(v: &Vector3<f64>, what: &str) -> BodyResult<Vector3<f64>> {
    v.try_normalize(DEGENERATE_EPS)
        .ok_or_else(|| BodyError::degenerate(what.to_string()))
}

/// Local basis of one cylinder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylinderBasis {
    pub axis: Vector3<f64>,
    pub lateral: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl CylinderBasis {
    /// Builds the basis of segment `tail → head` with roll fixed by `velocity`.
    pub fn from_segment(
        tail: &Point3<f64>,
        head: &Point3<f64>,
        velocity: &Vector3<f64>,
    ) -> BodyResult<Self> {
        let axis = unit(&(head - tail), "cylinder endpoints coincide")?;
        let lateral = unit(
            &(velocity - axis * velocity.dot(&axis)),
            "velocity is parallel to the cylinder axis",
        )?;
        let normal = axis.cross(&lateral);
        Ok(Self { axis, lateral, normal })
    }

    /// Basis as a matrix with columns (axis, lateral, normal).
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[self.axis, self.lateral, self.normal])
    }

    /// Rolls the basis about its own axis by `angle` radians
    /// (counter-clockwise seen from the head).
    pub fn rotated_about_axis(&self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            axis: self.axis,
            lateral: self.lateral * c + self.normal * s,
            normal: self.normal * c - self.lateral * s,
        }
    }

    /// Carries the basis onto a new segment direction.
    ///
    /// The new axis is projected on the (axis, lateral) plane to find the
    /// in-plane rotation, so a roll angle measured in this basis keeps its
    /// meaning in the carried one.
    pub fn carried_to(&self, new_axis: &Vector3<f64>) -> BodyResult<Self> {
        let v1 = unit(new_axis, "new cylinder direction")?;
        let (u, v, w) = change_basis(&-self.lateral, &self.axis, &self.normal, &v1)?;
        Ok(Self {
            axis: v,
            lateral: -u,
            normal: w,
        })
    }

    /// Largest deviation of `M^T M` from identity, plus the handedness error.
    pub fn orthonormality_error(&self) -> f64 {
        let m = self.to_matrix();
        let gram = (m.transpose() * m - Matrix3::identity()).abs().max();
        let handed = (self.axis.cross(&self.lateral) - self.normal).abs().max();
        gram.max(handed)
    }
}

/// Re-bases `(u0, v0, w0)` onto the new direction `v1`.
///
/// `v1` is projected on the plane orthogonal to `w0` and renormalized; its
/// cosine/sine against `u0`/`v0` give the rotation inside that plane. Returns
/// `(u1, v1, w1)` with `w1 = u1 × v1`.
pub fn change_basis(
    u0: &Vector3<f64>,
    v0: &Vector3<f64>,
    w0: &Vector3<f64>,
    v1: &Vector3<f64>,
) -> BodyResult<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let v2 = unit(&(v1 - w0 * v1.dot(w0)), "new direction is parallel to w0")?;
    let c = v2.dot(u0);
    let s = v2.dot(v0);
    let u1 = unit(&(u0 * s - v0 * c), "rotated u axis")?;
    let w1 = u1.cross(v1);
    Ok((u1, *v1, w1))
}

/// Where a set of cylinder bases was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSource {
    /// A captured frame index
    Captured(usize),
    /// The current topos
    Topos,
}

/// One basis per skeleton cylinder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CylinderFrames {
    pub source: FrameSource,
    bases: BTreeMap<CylinderId, CylinderBasis>,
}

impl CylinderFrames {
    /// Computes every cylinder basis from one set of marker positions.
    ///
    /// `column_of` maps a marker id to its index in `positions`.
    pub fn build(
        skeleton: &SkeletonGraph,
        positions: &[Point3<f64>],
        column_of: impl Fn(MarkerId) -> Option<usize>,
        velocity: &Vector3<f64>,
        source: FrameSource,
    ) -> BodyResult<Self> {
        let mut bases = BTreeMap::new();
        for (id, cylinder) in skeleton.cylinders() {
            let (tail, head) = endpoints(positions, &column_of, cylinder.tail, cylinder.head)?;
            let basis = CylinderBasis::from_segment(&tail, &head, velocity).map_err(|e| match e {
                BodyError::DegenerateVector(what) => {
                    BodyError::degenerate(format!("cylinder {}: {}", id, what))
                }
                other => other,
            })?;
            bases.insert(id, basis);
        }
        debug!("Built {} cylinder bases from {:?}", bases.len(), source);
        Ok(Self { source, bases })
    }

    /// Carries every basis onto the segment directions of another frame.
    pub fn carried_to_frame(
        &self,
        skeleton: &SkeletonGraph,
        positions: &[Point3<f64>],
        column_of: impl Fn(MarkerId) -> Option<usize>,
        frame: usize,
    ) -> BodyResult<Self> {
        let mut bases = BTreeMap::new();
        for (&id, basis) in &self.bases {
            let cylinder = skeleton.cylinder(id).ok_or(BodyError::UnknownCylinder(id))?;
            let (tail, head) = endpoints(positions, &column_of, cylinder.tail, cylinder.head)?;
            bases.insert(id, basis.carried_to(&(head - tail))?);
        }
        Ok(Self {
            source: FrameSource::Captured(frame),
            bases,
        })
    }

    pub fn get(&self, id: CylinderId) -> Option<&CylinderBasis> {
        self.bases.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CylinderId, &CylinderBasis)> {
        self.bases.iter().map(|(&id, b)| (id, b))
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Worst orthonormality error over all bases.
    pub fn max_orthonormality_error(&self) -> f64 {
        self.bases
            .values()
            .map(CylinderBasis::orthonormality_error)
            .fold(0.0, f64::max)
    }
}

pub(crate) fn endpoints(
    positions: &[Point3<f64>],
    column_of: impl Fn(MarkerId) -> Option<usize>,
    tail: MarkerId,
    head: MarkerId,
) -> BodyResult<(Point3<f64>, Point3<f64>)> {
    let lookup = |id: MarkerId| {
        column_of(id)
            .and_then(|c| positions.get(c))
            .copied()
            .ok_or(BodyError::UnknownMarker(id))
    };
    Ok((lookup(tail)?, lookup(head)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Cylinder;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_unit_segment_with_sideways_velocity() {
        let basis = CylinderBasis::from_segment(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, 1.0, 0.0),
        )
        .unwrap();

        assert_relative_eq!(basis.axis, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(basis.lateral, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(basis.normal, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(basis.to_matrix(), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_axial_component_is_removed() {
        let basis = CylinderBasis::from_segment(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(0.0, 0.0, 0.5),
            &Vector3::new(0.3, 0.0, 2.0),
        )
        .unwrap();
        assert_relative_eq!(basis.axis, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(basis.lateral, Vector3::x(), epsilon = 1e-12);
        assert!(basis.orthonormality_error() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let err = CylinderBasis::from_segment(&p, &p, &Vector3::x()).unwrap_err();
        assert!(matches!(err, BodyError::DegenerateVector(_)));

        let err = CylinderBasis::from_segment(&Point3::origin(), &p, &(p.coords * 2.0)).unwrap_err();
        assert!(matches!(err, BodyError::DegenerateVector(_)));
    }

    #[test]
    fn test_roll_about_axis() {
        let basis = CylinderBasis::from_segment(
            &Point3::origin(),
            &Point3::new(0.0, 0.0, 1.0),
            &Vector3::x(),
        )
        .unwrap();
        let rolled = basis.rotated_about_axis(std::f64::consts::FRAC_PI_2);

        assert_relative_eq!(rolled.axis, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(rolled.lateral, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(rolled.normal, -Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_change_basis_same_direction_is_identity() {
        let (u, v, w) = change_basis(&Vector3::x(), &Vector3::y(), &Vector3::z(), &Vector3::y()).unwrap();
        assert_relative_eq!(u, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(w, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_carry_follows_swing_in_plane() {
        // Leg pointing down, walking along +x; it swings forward in the x-z plane.
        let basis = CylinderBasis::from_segment(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::origin(),
            &Vector3::x(),
        )
        .unwrap();
        let swung = Vector3::new(0.5, 0.0, -(0.75f64).sqrt());
        let carried = basis.carried_to(&swung).unwrap();

        assert_relative_eq!(carried.axis, swung, epsilon = 1e-12);
        assert_relative_eq!(carried.normal, basis.normal, epsilon = 1e-12);
        assert!(carried.orthonormality_error() < 1e-12);

        let fresh = CylinderBasis::from_segment(&Point3::new(0.0, 0.0, 1.0), &(Point3::new(0.0, 0.0, 1.0) + swung), &Vector3::x()).unwrap();
        assert_relative_eq!(carried.lateral, fresh.lateral, epsilon = 1e-12);
    }

    #[test]
    fn test_frames_for_skeleton() {
        let mut skeleton = SkeletonGraph::new();
        skeleton.add_marker(0, "A");
        skeleton.add_marker(5, "B");
        skeleton.add_cylinder(2, Cylinder::new(0, 5, 0.1)).unwrap();

        let positions = [Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, 0.0)];
        let column_of = |id: MarkerId| match id {
            0 => Some(0),
            5 => Some(1),
            _ => None,
        };
        let frames = CylinderFrames::build(
            &skeleton,
            &positions,
            column_of,
            &Vector3::y(),
            FrameSource::Captured(0),
        )
        .unwrap();

        assert_eq!(frames.len(), 1);
        assert_relative_eq!(frames.get(2).unwrap().axis, -Vector3::z(), epsilon = 1e-12);
        assert!(frames.max_orthonormality_error() < 1e-12);

        let bent = [Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.6, 0.2)];
        let carried = frames.carried_to_frame(&skeleton, &bent, column_of, 7).unwrap();
        assert_eq!(carried.source, FrameSource::Captured(7));
        assert_relative_eq!(carried.get(2).unwrap().axis, Vector3::new(0.0, 0.6, -0.8), epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_basis_is_orthonormal_and_right_handed(
            a in prop::array::uniform3(-2.0f64..2.0),
            d in prop::array::uniform3(-2.0f64..2.0),
            v in prop::array::uniform3(-2.0f64..2.0),
            roll in -3.2f64..3.2,
        ) {
            let tail = Point3::from(a);
            let dir = Vector3::from(d);
            let vel = Vector3::from(v);
            prop_assume!(dir.norm() > 1e-3);
            prop_assume!(vel.cross(&dir).norm() > 1e-3 * dir.norm() * vel.norm().max(1e-3));

            let basis = CylinderBasis::from_segment(&tail, &(tail + dir), &vel).unwrap();
            prop_assert!(basis.orthonormality_error() < 1e-9);
            prop_assert!(basis.rotated_about_axis(roll).orthonormality_error() < 1e-9);
        }
    }
}
