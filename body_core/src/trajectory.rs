//! Timestamped ground trajectories that a body is walked along.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{BodyError, BodyResult};

/// One trajectory sample: time, ground position and unit velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl TrajectorySample {
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.vx, self.vy)
    }
}

/// A validated trajectory: at least two samples, strictly increasing time.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    pub fn new(samples: Vec<TrajectorySample>) -> BodyResult<Self> {
        if samples.len() < 2 {
            return Err(BodyError::shape(format!(
                "trajectory needs at least 2 samples, got {}",
                samples.len()
            )));
        }
        for (k, s) in samples.iter().enumerate() {
            if ![s.t, s.x, s.y, s.vx, s.vy].iter().all(|v| v.is_finite()) {
                return Err(BodyError::shape(format!("trajectory sample {} is not finite", k)));
            }
        }
        if let Some(k) = samples.windows(2).position(|w| w[1].t <= w[0].t) {
            return Err(BodyError::shape(format!(
                "trajectory time is not strictly increasing at sample {}",
                k + 1
            )));
        }
        Ok(Self { samples })
    }

    /// Builds a trajectory from positions, deriving unit velocities by
    /// forward differences (the last one is repeated).
    pub fn from_positions(times: &[f64], points: &[Point2<f64>]) -> BodyResult<Self> {
        if times.len() != points.len() {
            return Err(BodyError::shape(format!(
                "{} times for {} positions",
                times.len(),
                points.len()
            )));
        }
        let mut directions = points
            .windows(2)
            .enumerate()
            .map(|(k, w)| {
                (w[1] - w[0])
                    .try_normalize(1e-12)
                    .ok_or_else(|| BodyError::degenerate(format!("trajectory is stationary at sample {}", k)))
            })
            .collect::<BodyResult<Vec<_>>>()?;
        if let Some(&last) = directions.last() {
            directions.push(last);
        }

        let samples = times
            .iter()
            .zip(points)
            .zip(directions)
            .map(|((&t, p), d)| TrajectorySample {
                t,
                x: p.x,
                y: p.y,
                vx: d.x,
                vy: d.y,
            })
            .collect();
        Self::new(samples)
    }

    /// Reads a JSON array of `{t, x, y, vx, vy}` samples.
    pub fn from_json_str(json: &str) -> BodyResult<Self> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn t_min(&self) -> f64 {
        self.samples[0].t
    }

    pub fn t_max(&self) -> f64 {
        self.samples[self.samples.len() - 1].t
    }

    /// Mean spacing between samples.
    pub fn sample_interval(&self) -> f64 {
        (self.t_max() - self.t_min()) / (self.samples.len() - 1) as f64
    }

    /// Sample index holding time `t`.
    ///
    /// `t` must lie strictly inside the time range.
    pub fn sample_index(&self, t: f64) -> BodyResult<usize> {
        let (min, max) = (self.t_min(), self.t_max());
        if !(t > min && t < max) {
            return Err(BodyError::TemporalRange { time: t, min, max });
        }
        let k = ((t - min) / self.sample_interval()).floor() as usize;
        Ok(k.min(self.samples.len() - 1))
    }

    pub fn position(&self, k: usize) -> Option<Point2<f64>> {
        self.samples.get(k).map(TrajectorySample::position)
    }

    /// Stored unit velocity at sample `k`.
    pub fn direction(&self, k: usize) -> Option<Vector2<f64>> {
        self.samples.get(k).map(TrajectorySample::velocity)
    }

    pub fn sample(&self, k: usize) -> Option<&TrajectorySample> {
        self.samples.get(k)
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    /// Ground positions as a polyline.
    pub fn polyline(&self) -> Vec<Point2<f64>> {
        self.samples.iter().map(TrajectorySample::position).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
