//! Rerun visualization for walk runs.
//!
//! Visualization is optional and only available with the `visualization` feature.
//!
//! # What Gets Logged
//!
//! - Topos marker positions as points
//! - Skeleton cylinders as line segments
//! - Antenna frames as arrow triads
//! - The ground trajectory as a line strip

use body_core::PoseSnapshot;
use nalgebra::Point3;
#[cfg(feature = "visualization")]
use rerun::{Arrows3D, Color, LineStrips3D, Points3D, Position3D, Radius, RecordingStream};

/// Rerun logger for walk visualization.
pub struct RerunLogger {
    #[cfg(feature = "visualization")]
    rec: Option<RecordingStream>,

    /// Whether visualization is enabled
    enabled: bool,
}

impl RerunLogger {
    /// Creates a new logger with visualization disabled.
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "visualization")]
            rec: None,
            enabled: false,
        }
    }

    /// Creates a new logger with visualization enabled.
    #[cfg(feature = "visualization")]
    pub fn new(name: &str) -> Self {
        match rerun::RecordingStreamBuilder::new(name).spawn() {
            Ok(rec) => {
                tracing::info!("Rerun visualization enabled - open Rerun Viewer to see the walk");
                Self {
                    rec: Some(rec),
                    enabled: true,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Rerun: {:?}", e);
                Self::disabled()
            }
        }
    }

    /// Creates a logger - returns disabled if visualization feature not enabled.
    #[cfg(not(feature = "visualization"))]
    pub fn new(_name: &str) -> Self {
        tracing::info!("Rerun visualization not available (compile with --features visualization)");
        Self::disabled()
    }

    /// Returns whether visualization is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the walk time for subsequent logs.
    #[cfg(feature = "visualization")]
    pub fn set_time(&self, seconds: f64) {
        if let Some(ref rec) = self.rec {
            rec.set_time_seconds("walk_time", seconds);
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn set_time(&self, _seconds: f64) {}

    /// Logs the ground trajectory once.
    #[cfg(feature = "visualization")]
    pub fn log_trajectory(&self, polyline: &[Point3<f64>]) {
        if let Some(ref rec) = self.rec {
            let strip: Vec<[f32; 3]> = polyline.iter().map(f32_point).collect();
            let _ = rec.log_static(
                "world/trajectory",
                &LineStrips3D::new([strip]).with_colors([Color::from_rgb(120, 120, 120)]),
            );
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_trajectory(&self, _polyline: &[Point3<f64>]) {}

    /// Logs markers, cylinder segments and antenna frames of one pose.
    ///
    /// `segments` holds the (tail, head) world positions of every cylinder.
    #[cfg(feature = "visualization")]
    pub fn log_pose(&self, pose: &PoseSnapshot, segments: &[(Point3<f64>, Point3<f64>)]) {
        if let Some(ref rec) = self.rec {
            let points: Vec<Position3D> = pose
                .topos
                .positions
                .iter()
                .map(|p| Position3D::new(p.x as f32, p.y as f32, p.z as f32))
                .collect();
            let _ = rec.log(
                "world/body/markers",
                &Points3D::new(points)
                    .with_colors([Color::from_rgb(0, 255, 0)])
                    .with_radii([Radius::new_scene_units(0.02)]),
            );

            let strips: Vec<[[f32; 3]; 2]> = segments
                .iter()
                .map(|(tail, head)| [f32_point(tail), f32_point(head)])
                .collect();
            let _ = rec.log(
                "world/body/cylinders",
                &LineStrips3D::new(strips).with_colors([Color::from_rgb(100, 100, 255)]),
            );

            let mut origins = Vec::new();
            let mut vectors = Vec::new();
            let mut colors = Vec::new();
            for frame in pose.antennas.values() {
                let o = f32_point(&frame.origin);
                for (v, color) in [
                    (frame.basis.axis, Color::from_rgb(255, 100, 100)),
                    (frame.basis.lateral, Color::from_rgb(100, 255, 100)),
                    (frame.basis.normal, Color::from_rgb(100, 100, 255)),
                ] {
                    origins.push(o);
                    vectors.push([(v.x * 0.1) as f32, (v.y * 0.1) as f32, (v.z * 0.1) as f32]);
                    colors.push(color);
                }
            }
            let _ = rec.log(
                "world/body/antennas",
                &Arrows3D::from_vectors(vectors)
                    .with_origins(origins)
                    .with_colors(colors),
            );
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_pose(&self, _pose: &PoseSnapshot, _segments: &[(Point3<f64>, Point3<f64>)]) {}

    /// Logs a text annotation (e.g., an invariant failure).
    #[cfg(feature = "visualization")]
    pub fn log_event(&self, path: &str, message: &str) {
        if let Some(ref rec) = self.rec {
            let _ = rec.log(path, &rerun::TextLog::new(message));
        }
    }

    #[cfg(not(feature = "visualization"))]
    pub fn log_event(&self, _path: &str, _message: &str) {}
}

#[cfg(feature = "visualization")]
fn f32_point(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_logger() {
        let logger = RerunLogger::disabled();
        assert!(!logger.is_enabled());

        // These should be no-ops
        logger.set_time(1.0);
        logger.log_trajectory(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        logger.log_event("events", "noop");
    }
}
