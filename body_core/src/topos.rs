//! The topos engine: re-basing a captured frame onto a trajectory point.
//!
//! A query time selects both a trajectory sample and a captured frame (the
//! capture loops every `cycle_duration` seconds). The captured walking
//! direction is then mapped onto the trajectory direction by an exact
//! three-point similarity fit in the ground plane, lifted to 3D with the
//! vertical axis untouched, and applied to every marker of that frame.

use nalgebra::{Matrix2, Matrix3, Matrix3x4, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::centroid::CentroidTrack;
use crate::error::{BodyError, BodyResult};
use crate::motion::MotionSamples;
use crate::trajectory::Trajectory;

/// Determinants below this mark three source points as collinear.
const SINGULAR_EPS: f64 = 1e-12;

/// In-plane perpendicular, rotated a quarter turn clockwise.
pub fn perpendicular(v: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(v.y, -v.x)
}

fn unit2(v: &Vector2<f64>, what: impl FnOnce() -> String) -> BodyResult<Vector2<f64>> {
    v.try_normalize(SINGULAR_EPS)
        .ok_or_else(|| BodyError::degenerate(what()))
}

// ============================================================================
// AFFINE MAPS
// ============================================================================

/// 2D affine map `p ↦ linear·p + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine2 {
    pub linear: Matrix2<f64>,
    pub translation: Vector2<f64>,
}

impl Affine2 {
    /// Exact affine map sending the three `src` points onto the three `dst`
    /// points.
    pub fn fit(src: &[Point2<f64>; 3], dst: &[Point2<f64>; 3]) -> BodyResult<Self> {
        #[rustfmt::skip]
        let p = Matrix3::new(
            src[0].x, src[0].y, 1.0,
            src[1].x, src[1].y, 1.0,
            src[2].x, src[2].y, 1.0,
        );
        if p.determinant().abs() < SINGULAR_EPS {
            return Err(BodyError::degenerate("affine source points are collinear"));
        }
        let inv = p
            .try_inverse()
            .ok_or_else(|| BodyError::degenerate("affine source points are collinear"))?;

        let rx = inv * Vector3::new(dst[0].x, dst[1].x, dst[2].x);
        let ry = inv * Vector3::new(dst[0].y, dst[1].y, dst[2].y);

        Ok(Self {
            linear: Matrix2::new(rx[0], rx[1], ry[0], ry[1]),
            translation: Vector2::new(rx[2], ry[2]),
        })
    }

    pub fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from(self.linear * p.coords + self.translation)
    }
}

/// 3D transform applied to a captured frame: ground-plane similarity,
/// identity on the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToposTransform {
    pub linear: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl ToposTransform {
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Lifts a ground-plane map into 3D.
    pub fn lift(affine: &Affine2) -> Self {
        let mut linear = Matrix3::identity();
        linear.fixed_view_mut::<2, 2>(0, 0).copy_from(&affine.linear);
        Self {
            linear,
            translation: Vector3::new(affine.translation.x, affine.translation.y, 0.0),
        }
    }

    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.linear * p.coords + self.translation)
    }

    pub fn apply_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.linear * v
    }

    /// The `[linear | translation]` 3×4 matrix.
    pub fn to_homogeneous(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.linear);
        m.set_column(3, &self.translation);
        m
    }

    pub fn is_identity(&self, eps: f64) -> bool {
        (self.linear - Matrix3::identity()).abs().max() <= eps
            && self.translation.abs().max() <= eps
    }
}

// ============================================================================
// TOPOS QUERY
// ============================================================================

/// Which captured frame and trajectory sample a query time maps to, with
/// the unit directions on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToposLocation {
    pub frame_index: usize,
    pub sample_index: usize,
    /// Captured walking direction and its perpendicular
    pub source_dir: Vector2<f64>,
    pub source_perp: Vector2<f64>,
    /// Trajectory direction and its perpendicular
    pub target_dir: Vector2<f64>,
    pub target_perp: Vector2<f64>,
}

/// Maps query time `t` onto the trajectory and the looping capture.
///
/// The captured direction at frame `k` is the centroid step from `k - 1` to
/// `k`; frame 0 uses the step from 0 to 1.
pub fn locate(
    centroid: &CentroidTrack,
    trajectory: &Trajectory,
    t: f64,
    cycle_duration: f64,
) -> BodyResult<ToposLocation> {
    let sample_index = trajectory.sample_index(t)?;
    if !(cycle_duration > 0.0) {
        return Err(BodyError::shape(format!(
            "cycle duration must be positive, got {}",
            cycle_duration
        )));
    }
    let frames = centroid.len();
    if frames == 0 {
        return Err(BodyError::shape("centroid track is empty"));
    }

    let frame_period = cycle_duration / frames as f64;
    let frame_index = ((t.rem_euclid(cycle_duration) / frame_period).floor() as usize).min(frames - 1);

    let step = centroid.velocities[frame_index.saturating_sub(1)];
    let source_dir = unit2(&step.xy(), || {
        format!("captured centroid does not move at frame {}", frame_index)
    })?;

    let target = trajectory
        .sample(sample_index)
        .ok_or_else(|| BodyError::shape(format!("trajectory sample {} missing", sample_index)))?;
    let target_dir = unit2(&target.velocity(), || {
        format!("trajectory velocity is zero at sample {}", sample_index)
    })?;

    Ok(ToposLocation {
        frame_index,
        sample_index,
        source_dir,
        source_perp: perpendicular(&source_dir),
        target_dir,
        target_perp: perpendicular(&target_dir),
    })
}

/// The current world-space pose of the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topos {
    /// Query time
    pub time: f64,

    /// Captured frame that was re-based
    pub frame_index: usize,

    /// Trajectory sample the body was placed on
    pub sample_index: usize,

    pub transform: ToposTransform,

    /// Transformed marker positions, in sample column order
    pub positions: Vec<Point3<f64>>,

    /// Walking direction in world space (unit, horizontal)
    pub velocity: Vector3<f64>,
}

impl Topos {
    /// Places the captured frame selected by `t` on the trajectory.
    ///
    /// `samples` must be centered and `centroid` must be the track removed
    /// by that centering.
    pub fn compute(
        samples: &MotionSamples,
        centroid: &CentroidTrack,
        trajectory: &Trajectory,
        t: f64,
        cycle_duration: f64,
    ) -> BodyResult<Self> {
        if centroid.len() != samples.frame_count() {
            return Err(BodyError::shape(format!(
                "centroid track has {} frames, samples have {}",
                centroid.len(),
                samples.frame_count()
            )));
        }
        let loc = locate(centroid, trajectory, t, cycle_duration)?;

        let origin = Point2::origin();
        let src = [origin, origin + loc.source_dir, origin + loc.source_perp];

        let anchor = trajectory
            .sample(loc.sample_index)
            .map(|s| s.position())
            .ok_or_else(|| BodyError::shape("trajectory sample missing"))?;
        let dst = [anchor, anchor + loc.target_dir, anchor + loc.target_perp];

        let transform = ToposTransform::lift(&Affine2::fit(&src, &dst)?);

        let positions = samples
            .frame(loc.frame_index)?
            .iter()
            .map(|p| transform.apply(p))
            .collect();
        let velocity =
            transform.apply_vector(&Vector3::new(loc.source_dir.x, loc.source_dir.y, 0.0));

        debug!(
            "Topos t={:.3}s: frame {} on sample {} at ({:.3}, {:.3})",
            t, loc.frame_index, loc.sample_index, anchor.x, anchor.y
        );

        Ok(Self {
            time: t,
            frame_index: loc.frame_index,
            sample_index: loc.sample_index,
            transform,
            positions,
            velocity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centroid::center_samples;
    use crate::trajectory::TrajectorySample;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Two markers walking along +x by 0.01 m per frame.
    fn walker(frames: usize) -> (MotionSamples, CentroidTrack) {
        let data = (0..frames)
            .map(|k| {
                let x = 0.01 * k as f64;
                vec![Point3::new(x + 0.2, 0.1, 1.6), Point3::new(x - 0.2, -0.1, 0.1)]
            })
            .collect();
        let mut samples = MotionSamples::from_frames(vec![0, 1], data).unwrap();
        let track = center_samples(&mut samples);
        (samples, track)
    }

    fn line(direction: Vector2<f64>, speed: f64) -> Trajectory {
        let d = direction.normalize();
        let samples = (0..=100)
            .map(|k| {
                let t = k as f64 * 0.1;
                TrajectorySample {
                    t,
                    x: d.x * speed * t,
                    y: d.y * speed * t,
                    vx: d.x,
                    vy: d.y,
                }
            })
            .collect();
        Trajectory::new(samples).unwrap()
    }

    #[test]
    fn test_affine_fit_exact() {
        let src = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        let dst = [Point2::new(2.0, 1.0), Point2::new(2.0, 3.0), Point2::new(0.0, 1.0)];
        let a = Affine2::fit(&src, &dst).unwrap();

        for (s, d) in src.iter().zip(&dst) {
            assert_relative_eq!(a.apply(s), *d, epsilon = 1e-12);
        }
        assert_relative_eq!(a.linear, Matrix2::new(0.0, -2.0, 2.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_affine_fit_rejects_collinear() {
        let src = [Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), Point2::new(2.0, 2.0)];
        let err = Affine2::fit(&src, &src).unwrap_err();
        assert!(matches!(err, BodyError::DegenerateVector(_)));
    }

    #[test]
    fn test_lift_keeps_vertical_axis() {
        let affine = Affine2 {
            linear: Matrix2::new(0.0, -1.0, 1.0, 0.0),
            translation: Vector2::new(3.0, 4.0),
        };
        let t = ToposTransform::lift(&affine);
        let p = t.apply(&Point3::new(1.0, 0.0, 1.7));
        assert_relative_eq!(p, Point3::new(3.0, 5.0, 1.7), epsilon = 1e-12);

        let h = t.to_homogeneous();
        assert_relative_eq!(h[(2, 2)], 1.0);
        assert_relative_eq!(h[(1, 3)], 4.0);
        assert_relative_eq!(h[(2, 3)], 0.0);
    }

    #[test]
    fn test_identity_when_directions_match_at_origin() {
        let (samples, track) = walker(20);
        // A trajectory along +x that passes through the origin at t = 0.05.
        let samples_traj = (0..=100)
            .map(|k| {
                let t = k as f64 * 0.1 - 0.05;
                TrajectorySample { t, x: if k == 0 { 0.0 } else { t }, y: 0.0, vx: 1.0, vy: 0.0 }
            })
            .collect();
        let traj = Trajectory::new(samples_traj).unwrap();

        let topos = Topos::compute(&samples, &track, &traj, 0.0, 2.0).unwrap();
        assert_eq!(topos.sample_index, 0);
        assert!(topos.transform.is_identity(1e-12));
        for (a, b) in topos.positions.iter().zip(samples.frame(topos.frame_index).unwrap()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_straight_line_translates_exactly() {
        let (samples, track) = walker(20);
        let traj = line(Vector2::x(), 1.4);

        let topos = Topos::compute(&samples, &track, &traj, 2.35, 2.0).unwrap();

        // Frame period is 0.1 s, 2.35 mod 2.0 = 0.35 → frame 3; sample 23.
        assert_eq!(topos.frame_index, 3);
        assert_eq!(topos.sample_index, 23);
        assert_relative_eq!(topos.transform.linear, Matrix3::identity(), epsilon = 1e-12);
        let anchor = traj.sample(23).unwrap();
        assert_relative_eq!(topos.transform.translation, Vector3::new(anchor.x, anchor.y, 0.0), epsilon = 1e-12);

        let captured = samples.frame(3).unwrap();
        assert_relative_eq!(
            topos.positions[0],
            captured[0] + Vector3::new(anchor.x, anchor.y, 0.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(topos.velocity, Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_turned_trajectory_rotates_body() {
        let (samples, track) = walker(20);
        let traj = line(Vector2::y(), 1.0);

        let topos = Topos::compute(&samples, &track, &traj, 1.05, 2.0).unwrap();
        let rot = Matrix3::new(
            FRAC_PI_2.cos(), -FRAC_PI_2.sin(), 0.0,
            FRAC_PI_2.sin(), FRAC_PI_2.cos(), 0.0,
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(topos.transform.linear, rot, epsilon = 1e-12);
        assert_relative_eq!(topos.velocity, Vector3::y(), epsilon = 1e-12);

        // Heights survive the re-basing.
        let captured = samples.frame(topos.frame_index).unwrap();
        assert_relative_eq!(topos.positions[0].z, captured[0].z, epsilon = 1e-12);
    }

    #[test]
    fn test_query_outside_range() {
        let (samples, track) = walker(20);
        let traj = line(Vector2::x(), 1.0);
        let err = Topos::compute(&samples, &track, &traj, 10.0, 2.0).unwrap_err();
        assert!(matches!(err, BodyError::TemporalRange { .. }));
    }

    #[test]
    fn test_standing_capture_is_degenerate() {
        let data = vec![vec![Point3::new(0.0, 0.0, 1.0)]; 4];
        let mut samples = MotionSamples::from_frames(vec![0], data).unwrap();
        let track = center_samples(&mut samples);
        let err = Topos::compute(&samples, &track, &line(Vector2::x(), 1.0), 0.5, 1.0).unwrap_err();
        assert!(matches!(err, BodyError::DegenerateVector(_)));
    }
}
