//! Cycle compositor: walking a canonical gait cycle along a polyline.
//!
//! A two-step cycle is rotated towards each trajectory segment, moved to
//! the segment start and consumed frame by frame in proportion to the
//! segment length. The frame cursor carries over from segment to segment
//! and wraps around the cycle, so the gait phase stays continuous.

use std::ops::Range;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CycleConfig, HeadingMode};
use crate::cylinder::unit;
use crate::error::{BodyError, BodyResult};
use crate::motion::MotionSamples;

/// One gait period of marker positions (frames × markers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkingCycle {
    frames: Vec<Vec<Point3<f64>>>,
}

impl WalkingCycle {
    pub fn new(frames: Vec<Vec<Point3<f64>>>) -> BodyResult<Self> {
        let markers = frames.first().map_or(0, Vec::len);
        if markers == 0 {
            return Err(BodyError::shape("walking cycle needs at least one frame and one marker"));
        }
        if frames.iter().any(|f| f.len() != markers) {
            return Err(BodyError::shape("walking cycle frames differ in marker count"));
        }
        Ok(Self { frames })
    }

    pub fn from_samples(samples: &MotionSamples) -> BodyResult<Self> {
        Self::new(samples.frames().to_vec())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn marker_count(&self) -> usize {
        self.frames[0].len()
    }

    pub fn frames(&self) -> &[Vec<Point3<f64>>] {
        &self.frames
    }

    /// First marker at the first frame; the cycle's reference point.
    pub fn anchor(&self) -> Point3<f64> {
        self.frames[0][0]
    }

    /// First marker at the last frame.
    pub fn final_anchor(&self) -> Point3<f64> {
        self.frames[self.frames.len() - 1][0]
    }

    /// Shifts the whole cycle so that its anchor lands on `new_origin`.
    pub fn translate(&self, new_origin: &Point3<f64>) -> Self {
        let offset = new_origin - self.anchor();
        self.map(|p| p + offset)
    }

    /// Rotates the cycle about the vertical line through its anchor by
    /// `alpha` radians, counter-clockwise seen from above.
    pub fn rotate(&self, alpha: f64) -> Self {
        let (s, c) = alpha.sin_cos();
        let anchor = self.anchor();
        let rotated = self.map(|p| Point3::new(p.x * c - p.y * s, p.x * s + p.y * c, p.z));
        rotated.translate(&anchor)
    }

    /// Horizontal body-forward direction at frame 0, perpendicular to the
    /// shoulder line (`[right, left]` marker columns).
    pub fn forward_reference(&self, shoulders: [usize; 2]) -> BodyResult<Vector3<f64>> {
        let first = &self.frames[0];
        let [right, left] = shoulders;
        let (r, l) = match (first.get(right), first.get(left)) {
            (Some(r), Some(l)) => (r, l),
            _ => {
                return Err(BodyError::shape(format!(
                    "shoulder columns {:?} outside {} markers",
                    shoulders,
                    first.len()
                )))
            }
        };
        let across = Vector3::new(r.x - l.x, r.y - l.y, 0.0);
        unit(&Vector3::z().cross(&across), "shoulder line is vertical or empty")
    }

    fn map(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Self {
        Self {
            frames: self
                .frames
                .iter()
                .map(|frame| frame.iter().map(&f).collect())
                .collect(),
        }
    }

    fn slice(&self, range: Range<usize>) -> Vec<Vec<Point3<f64>>> {
        self.frames[range].to_vec()
    }
}

/// Ground-plane rotation taking `reference` onto `direction`.
pub fn heading_angle(reference: &Vector3<f64>, direction: &Vector3<f64>, mode: HeadingMode) -> f64 {
    let r = reference.xy();
    let d = direction.xy();
    match mode {
        HeadingMode::Signed => (r.x * d.y - r.y * d.x).atan2(r.dot(&d)),
        HeadingMode::Unsigned => {
            let cos = r.dot(&d) / (r.norm() * d.norm());
            cos.clamp(-1.0, 1.0).acos()
        }
    }
}

/// A contiguous run of cycle frames emitted for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSlice {
    /// Index of the trajectory segment (0 = first two points)
    pub segment: usize,

    /// Cycle frame index of the first frame in `frames`
    pub first_frame: usize,

    pub frames: Vec<Vec<Point3<f64>>>,
}

/// A synthesized walk: slices in emission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StitchedWalk {
    pub slices: Vec<CycleSlice>,
}

impl StitchedWalk {
    pub fn frame_count(&self) -> usize {
        self.slices.iter().map(|s| s.frames.len()).sum()
    }

    /// All frames, flattened in walking order.
    pub fn frames(&self) -> impl Iterator<Item = &Vec<Point3<f64>>> {
        self.slices.iter().flat_map(|s| s.frames.iter())
    }
}

/// Stitches copies of `cycle` along the polyline `path`.
///
/// Each segment consumes `frames_for_distance(len)` frames from where the
/// previous segment stopped. When the cursor runs past the end of the
/// cycle, the remaining frames come from a copy re-anchored one frame's
/// advance beyond the last anchor position.
pub fn stitch_along_trajectory(
    cycle: &WalkingCycle,
    path: &[Point3<f64>],
    config: &CycleConfig,
) -> BodyResult<StitchedWalk> {
    config.validate()?;
    let reference = cycle.forward_reference(config.shoulder_columns)?;
    let total = cycle.frame_count();
    let mut walk = StitchedWalk::default();
    let mut cursor = 0;

    for (segment, w) in path.windows(2).enumerate() {
        let step = w[1] - w[0];
        let direction = unit(&step, &format!("trajectory segment {} has zero length", segment))?;
        let heading = unit(
            &Vector3::new(direction.x, direction.y, 0.0),
            &format!("trajectory segment {} is vertical", segment),
        )?;

        let alpha = heading_angle(&reference, &heading, config.heading);
        let mut copy = cycle.rotate(alpha).translate(&w[0]);
        let mut remaining = config.frames_for_distance(step.norm());
        debug!(
            "Segment {}: {:.2} units, heading {:.3} rad, {} frames from {}",
            segment,
            step.norm(),
            alpha,
            remaining,
            cursor
        );

        while remaining > 0 {
            let take = remaining.min(total - cursor);
            walk.slices.push(CycleSlice {
                segment,
                first_frame: cursor,
                frames: copy.slice(cursor..cursor + take),
            });
            remaining -= take;
            cursor += take;

            if cursor == total {
                cursor = 0;
                if remaining > 0 {
                    let next = copy.final_anchor() + direction * config.advance_per_frame();
                    copy = copy.translate(&next);
                }
            }
        }
    }

    Ok(walk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// Five markers (column 3 = right shoulder, 4 = left shoulder) facing +x,
    /// advancing 140/126 units per frame.
    fn cycle(frames: usize) -> WalkingCycle {
        let step = 140.0 / 126.0;
        WalkingCycle::new(
            (0..frames)
                .map(|k| {
                    let x = step * k as f64;
                    vec![
                        Point3::new(x, 0.0, 0.0),
                        Point3::new(x + 5.0, 3.0, 90.0),
                        Point3::new(x - 5.0, -3.0, 50.0),
                        Point3::new(x, -20.0, 140.0),
                        Point3::new(x, 20.0, 140.0),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    fn assert_cycles_eq(a: &WalkingCycle, b: &WalkingCycle) {
        for (fa, fb) in a.frames().iter().zip(b.frames()) {
            for (pa, pb) in fa.iter().zip(fb) {
                assert_relative_eq!(*pa, *pb, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_translate_moves_anchor() {
        let c = cycle(4);
        let moved = c.translate(&Point3::new(10.0, -2.0, 0.0));
        assert_relative_eq!(moved.anchor(), Point3::new(10.0, -2.0, 0.0));
        assert_relative_eq!(moved.frames()[3][1], c.frames()[3][1] + Vector3::new(10.0, -2.0, 0.0));
        assert_cycles_eq(&moved.translate(&c.anchor()), &c);
    }

    #[test]
    fn test_rotate_about_anchor() {
        let c = cycle(3).translate(&Point3::new(7.0, 7.0, 0.0));
        let r = c.rotate(FRAC_PI_2);

        assert_relative_eq!(r.anchor(), c.anchor(), epsilon = 1e-12);
        let rel = r.frames()[0][1] - r.anchor();
        assert_relative_eq!(rel, Vector3::new(-3.0, 5.0, 90.0), epsilon = 1e-12);
        assert_cycles_eq(&r.rotate(-FRAC_PI_2), &c);
    }

    #[test]
    fn test_forward_reference_faces_walking_direction() {
        let forward = cycle(2).forward_reference([3, 4]).unwrap();
        assert_relative_eq!(forward, Vector3::x(), epsilon = 1e-12);
        assert!(cycle(2).forward_reference([3, 9]).is_err());
    }

    #[test]
    fn test_heading_modes() {
        let r = Vector3::x();
        let right_turn = Vector3::new(0.0, -1.0, 0.0);
        assert_relative_eq!(heading_angle(&r, &right_turn, HeadingMode::Signed), -FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(heading_angle(&r, &right_turn, HeadingMode::Unsigned), FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(heading_angle(&r, &-r, HeadingMode::Signed).abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_reference_distance_consumes_full_cycle() {
        let c = cycle(126);
        let path = [Point3::origin(), Point3::new(140.0, 0.0, 0.0)];
        let walk = stitch_along_trajectory(&c, &path, &CycleConfig::default()).unwrap();

        assert_eq!(walk.slices.len(), 1);
        assert_eq!(walk.frame_count(), 126);
        assert_eq!(walk.slices[0].first_frame, 0);
        assert_cycles_eq(&WalkingCycle::new(walk.slices[0].frames.clone()).unwrap(), &c);
    }

    #[test]
    fn test_cursor_carries_and_wraps() {
        let c = cycle(126);
        let path = [
            Point3::origin(),
            Point3::new(100.0, 0.0, 0.0),
            Point3::new(100.0, 100.0, 0.0),
        ];
        let walk = stitch_along_trajectory(&c, &path, &CycleConfig::default()).unwrap();

        // 100 units → 90 frames each; the second segment wraps after 36.
        assert_eq!(walk.slices.len(), 3);
        assert_eq!((walk.slices[0].first_frame, walk.slices[0].frames.len()), (0, 90));
        assert_eq!((walk.slices[1].first_frame, walk.slices[1].frames.len()), (90, 36));
        assert_eq!((walk.slices[2].first_frame, walk.slices[2].frames.len()), (0, 54));
        assert_eq!(walk.frame_count(), 180);

        // Second segment turns left: the cycle now advances along +y.
        let turned = &walk.slices[1].frames;
        let advance = turned[1][0] - turned[0][0];
        assert_relative_eq!(advance, Vector3::new(0.0, 140.0 / 126.0, 0.0), epsilon = 1e-9);

        // The wrapped copy starts one frame's advance past the previous end.
        let gap = walk.slices[2].frames[0][0] - turned[35][0];
        assert_relative_eq!(gap, Vector3::new(0.0, 140.0 / 126.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_long_segment_wraps_repeatedly() {
        let c = cycle(126);
        let path = [Point3::origin(), Point3::new(0.0, -350.0, 0.0)];
        let walk = stitch_along_trajectory(&c, &path, &CycleConfig::default()).unwrap();

        assert_eq!(walk.frame_count(), 315);
        assert_eq!(walk.slices.len(), 3);
        assert!(walk.slices.iter().all(|s| s.segment == 0));
    }

    #[test]
    fn test_zero_length_segment_is_degenerate() {
        let c = cycle(10);
        let path = [Point3::origin(), Point3::origin()];
        let err = stitch_along_trajectory(&c, &path, &CycleConfig::default()).unwrap_err();
        assert!(matches!(err, BodyError::DegenerateVector(_)));
    }

    #[test]
    fn test_zero_reference_distance_is_rejected() {
        let c = cycle(10);
        let path = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let config = CycleConfig { reference_distance: 0.0, ..CycleConfig::default() };
        let err = stitch_along_trajectory(&c, &path, &config).unwrap_err();
        assert!(matches!(err, BodyError::ShapeMismatch(_)));
    }

    #[test]
    fn test_unsigned_heading_mirrors_right_turns() {
        let c = cycle(126);
        let path = [Point3::origin(), Point3::new(0.0, -70.0, 0.0)];
        let right = Vector3::new(0.0, -140.0 / 126.0, 0.0);

        let signed = stitch_along_trajectory(&c, &path, &CycleConfig::default()).unwrap();
        let frames = &signed.slices[0].frames;
        assert_relative_eq!(frames[1][0] - frames[0][0], right, epsilon = 1e-9);

        let config = CycleConfig { heading: HeadingMode::Unsigned, ..CycleConfig::default() };
        let unsigned = stitch_along_trajectory(&c, &path, &config).unwrap();
        let frames = &unsigned.slices[0].frames;
        assert_eq!(unsigned.frame_count(), 63);
        assert_relative_eq!(frames[1][0] - frames[0][0], -right, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_rotate_then_unrotate_is_identity(
            alpha in -6.3f64..6.3,
            ox in -50.0f64..50.0,
            oy in -50.0f64..50.0,
        ) {
            let c = cycle(5).translate(&Point3::new(ox, oy, 0.0));
            let back = c.rotate(alpha).rotate(-alpha);
            for (fa, fb) in back.frames().iter().zip(c.frames()) {
                for (pa, pb) in fa.iter().zip(fb) {
                    prop_assert!((pa - pb).norm() < 1e-9);
                }
            }
        }

        #[test]
        fn prop_translate_then_back_is_identity(
            ox in -500.0f64..500.0,
            oy in -500.0f64..500.0,
            oz in -5.0f64..5.0,
        ) {
            let c = cycle(5);
            let back = c.translate(&Point3::new(ox, oy, oz)).translate(&c.anchor());
            for (fa, fb) in back.frames().iter().zip(c.frames()) {
                for (pa, pb) in fa.iter().zip(fb) {
                    prop_assert!((pa - pb).norm() < 1e-9);
                }
            }
        }
    }
}
