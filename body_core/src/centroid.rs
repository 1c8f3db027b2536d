//! Centroid tracker: ground-projected body centroid and its velocity.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::motion::MotionSamples;

/// Ground projection of the marker centroid for every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidTrack {
    /// Centroid per frame, vertical component forced to zero
    pub positions: Vec<Point3<f64>>,

    /// Forward difference per frame; the last one is repeated so both
    /// vectors have one entry per frame
    pub velocities: Vec<Vector3<f64>>,
}

impl CentroidTrack {
    /// Computes the track without touching the samples.
    pub fn compute(samples: &MotionSamples) -> Self {
        let positions: Vec<Point3<f64>> = samples
            .frames()
            .iter()
            .map(|frame| {
                let mut c = mean_marker_position(frame);
                c.z = 0.0;
                c
            })
            .collect();

        let mut velocities: Vec<Vector3<f64>> =
            positions.windows(2).map(|w| w[1] - w[0]).collect();
        match velocities.last().copied() {
            Some(last) => velocities.push(last),
            None if !positions.is_empty() => velocities.push(Vector3::zeros()),
            None => {}
        }

        Self { positions, velocities }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn velocity(&self, k: usize) -> Option<&Vector3<f64>> {
        self.velocities.get(k)
    }
}

/// Re-centers every frame on its ground-projected centroid.
///
/// Original absolute positions are not kept; the returned track is the only
/// record of where the body was.
pub fn center_samples(samples: &mut MotionSamples) -> CentroidTrack {
    let track = CentroidTrack::compute(samples);
    for (frame, c) in samples.frames_mut().iter_mut().zip(&track.positions) {
        for p in frame.iter_mut() {
            *p -= c.coords;
        }
    }
    debug!("Centered {} frames", track.len());
    track
}

/// Mean marker position of one frame.
pub fn mean_marker_position(frame: &[Point3<f64>]) -> Point3<f64> {
    if frame.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = frame.iter().map(|p| p.coords).sum();
    Point3::from(sum / frame.len() as f64)
}
