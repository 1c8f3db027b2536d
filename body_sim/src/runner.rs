//! Scenario runner - walks the synthetic body along scenario trajectories.

use std::path::Path;

use body_core::{
    stitch_along_trajectory, BodyConfig, BodyModel, CycleConfig, PoseSnapshot, Trajectory,
    WalkingCycle,
};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::exporter::{WalkExport, WalkTick};
use crate::gait::GaitSynthesizer;
use crate::scenarios::ScenarioId;
use crate::visualizer::RerunLogger;

/// Built-in body description.
pub const JOHN: &str = include_str!("../assets/john.json");

/// Largest tolerated deviation of a cylinder basis from orthonormal.
const ORTHONORMAL_TOL: f64 = 1e-9;

/// Largest tolerated gap between the topos centroid and its trajectory point (m).
const CENTROID_TOL: f64 = 1e-6;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether every tick satisfied the invariants
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Last query time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: RunMetrics,
}

/// Metrics collected during a walk.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    /// Worst cylinder basis orthonormality error
    pub max_orthonormality_error: f64,

    /// Worst horizontal distance between topos centroid and trajectory point (m)
    pub max_centroid_offset: f64,

    /// Antenna frames derived over the run
    pub antenna_frames: u64,

    /// Length of the ground trajectory (m)
    pub distance_m: f64,

    /// Description entries skipped while loading
    pub skipped_entries: usize,
}

/// Outcome of stitching the gait cycle along a scenario path.
#[derive(Debug, Clone)]
pub struct StitchReport {
    pub scenario: ScenarioId,
    pub segments: usize,
    pub slices: usize,
    pub frames: usize,

    /// Times the cycle cursor wrapped back to frame 0
    pub wraps: usize,
}

/// Runs walk scenarios.
pub struct ScenarioRunner {
    /// Seed for marker noise
    seed: u64,

    /// Trajectory length in seconds
    duration: f64,

    /// Real-time length of one gait cycle in seconds
    step_period: f64,

    /// Marker noise (cm)
    noise_cm: f64,

    /// Query rate in Hz
    tick_rate_hz: u32,

    /// Trajectory sample spacing in seconds
    sample_dt: f64,

    /// Time between stitched path points in seconds
    stitch_interval: f64,

    /// Body description JSON
    body: String,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration: 10.0,
            step_period: 1.05,
            noise_cm: 0.0,
            tick_rate_hz: 30,
            sample_dt: 0.05,
            stitch_interval: 0.5,
            body: JOHN.to_string(),
        }
    }

    /// Sets the trajectory duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = secs;
        self
    }

    /// Sets the gait cycle period.
    pub fn with_step_period(mut self, secs: f64) -> Self {
        self.step_period = secs;
        self
    }

    /// Sets the marker noise.
    pub fn with_noise(mut self, std_dev_cm: f64) -> Self {
        self.noise_cm = std_dev_cm;
        self
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Replaces the built-in body description.
    pub fn with_body(mut self, json: String) -> Self {
        self.body = json;
        self
    }

    fn gait(&self) -> GaitSynthesizer {
        GaitSynthesizer::new(self.seed).with_noise(self.noise_cm)
    }

    /// Ground speed implied by the gait cycle and its period (m/s).
    pub fn speed(&self) -> f64 {
        self.gait().cycle_length() / self.step_period
    }

    /// Loads the body against a freshly synthesized capture.
    pub fn load_body(&self) -> SimResult<(BodyModel, usize)> {
        let gait = self.gait();
        let config = BodyConfig::default().with_frame_count(gait.frames());
        let loaded = BodyModel::from_decoder(&self.body, &gait, Path::new("synthetic-gait"), config)?;
        if !loaded.is_clean() {
            warn!("Body description: {} entries skipped", loaded.warnings.len());
        }
        let skipped = loaded.warnings.len();
        Ok((loaded.value, skipped))
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_logged(scenario, &RerunLogger::disabled(), None)
    }

    /// Runs a scenario and writes every tick to `export_path`.
    pub fn run_with_export(&self, scenario: ScenarioId, export_path: &str) -> ScenarioResult {
        self.run_logged(scenario, &RerunLogger::disabled(), Some(export_path))
    }

    /// Runs a scenario, logging poses to `logger` and optionally exporting them.
    pub fn run_logged(
        &self,
        scenario: ScenarioId,
        logger: &RerunLogger,
        export_path: Option<&str>,
    ) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: None,
            metrics: RunMetrics::default(),
        };
        match self.execute(scenario, logger, export_path, &mut result) {
            Ok(()) => result.passed = true,
            Err(e) => {
                logger.log_event("events", &e.to_string());
                result.failure_reason = Some(e.to_string());
            }
        }
        result
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        logger: &RerunLogger,
        export_path: Option<&str>,
        result: &mut ScenarioResult,
    ) -> SimResult<()> {
        let metrics = &mut result.metrics;
        let (mut body, skipped) = self.load_body()?;
        metrics.skipped_entries = skipped;
        body.center()?;

        let trajectory = scenario.trajectory(self.duration, self.speed(), self.sample_dt)?;
        let polyline: Vec<Point3<f64>> = trajectory
            .polyline()
            .iter()
            .map(|p| Point3::new(p.x, p.y, 0.0))
            .collect();
        metrics.distance_m = polyline.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        logger.log_trajectory(&polyline);

        let times = self.tick_times(&trajectory);
        let poses = body.topos_sequence(&trajectory, &times, self.step_period)?;

        let mut export = export_path.map(|_| {
            let mut export = WalkExport::new(scenario.name(), self.seed, self.step_period, &body);
            export.trajectory = trajectory.polyline().iter().map(|p| [p.x, p.y]).collect();
            export
        });

        for pose in &poses {
            result.total_ticks += 1;
            result.final_time_secs = pose.topos.time;

            let (ortho, offset) = check_pose(&body, &trajectory, pose)?;
            metrics.max_orthonormality_error = metrics.max_orthonormality_error.max(ortho);
            metrics.max_centroid_offset = metrics.max_centroid_offset.max(offset);
            metrics.antenna_frames += pose.antennas.len() as u64;

            logger.set_time(pose.topos.time);
            logger.log_pose(pose, &segments(&body, pose));

            if let Some(export) = export.as_mut() {
                export.add_tick(WalkTick::from_pose(&body, pose));
            }

            if result.total_ticks % 30 == 0 {
                debug!(
                    "  t={:.1}s | frame={} | sample={} | antennas={}",
                    pose.topos.time,
                    pose.topos.frame_index,
                    pose.topos.sample_index,
                    pose.antennas.len()
                );
            }
        }

        if let (Some(export), Some(path)) = (export.as_mut(), export_path) {
            export.finalize(true);
            export.write_to_file(path)?;
            info!("Exported {} ticks to {}", export.ticks.len(), path);
        }
        Ok(())
    }

    /// Query times strictly inside the trajectory range.
    fn tick_times(&self, trajectory: &Trajectory) -> Vec<f64> {
        let dt = 1.0 / self.tick_rate_hz.max(1) as f64;
        (1..)
            .map(|k| trajectory.t_min() + k as f64 * dt)
            .take_while(|&t| t < trajectory.t_max())
            .collect()
    }

    /// Stitches the synthesized cycle along the scenario path.
    pub fn stitch(&self, scenario: ScenarioId) -> SimResult<StitchReport> {
        let (body, _) = self.load_body()?;
        let cycle = WalkingCycle::from_samples(body.samples())?;
        let gait = self.gait();
        let config = CycleConfig {
            reference_distance: gait.cycle_length(),
            reference_frames: gait.frames(),
            ..CycleConfig::default()
        };

        let trajectory = scenario.trajectory(self.duration, self.speed(), self.sample_dt)?;
        let stride = ((self.stitch_interval / self.sample_dt).round() as usize).max(1);
        let points = trajectory.polyline();
        let mut path: Vec<Point3<f64>> = points
            .iter()
            .step_by(stride)
            .map(|p| Point3::new(p.x, p.y, 0.0))
            .collect();
        if (points.len() - 1) % stride != 0 {
            if let Some(last) = points.last() {
                path.push(Point3::new(last.x, last.y, 0.0));
            }
        }

        let walk = stitch_along_trajectory(&cycle, &path, &config)?;
        let expected: usize = path
            .windows(2)
            .map(|w| config.frames_for_distance((w[1] - w[0]).norm()))
            .sum();
        if walk.frame_count() != expected {
            return Err(SimError::Invariant {
                time: trajectory.t_max(),
                reason: format!("stitched {} frames, expected {}", walk.frame_count(), expected),
            });
        }

        let wraps = walk.slices.iter().skip(1).filter(|s| s.first_frame == 0).count();
        info!(
            "Stitched {} along {} segments: {} slices, {} frames, {} wraps",
            scenario.name(),
            path.len() - 1,
            walk.slices.len(),
            walk.frame_count(),
            wraps
        );
        Ok(StitchReport {
            scenario,
            segments: path.len() - 1,
            slices: walk.slices.len(),
            frames: walk.frame_count(),
            wraps,
        })
    }
}

/// Checks one pose; returns (orthonormality error, centroid offset).
fn check_pose(
    body: &BodyModel,
    trajectory: &Trajectory,
    pose: &PoseSnapshot,
) -> SimResult<(f64, f64)> {
    let time = pose.topos.time;
    let invariant = |reason: String| SimError::Invariant { time, reason };

    let ortho = pose.cylinders.max_orthonormality_error();
    if ortho > ORTHONORMAL_TOL {
        return Err(invariant(format!("cylinder basis off by {:.2e}", ortho)));
    }

    let anchor = trajectory
        .position(pose.topos.sample_index)
        .ok_or_else(|| invariant(format!("no trajectory sample {}", pose.topos.sample_index)))?;
    let n = pose.topos.positions.len().max(1) as f64;
    let (sx, sy) = pose
        .topos
        .positions
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    let offset = ((sx / n - anchor.x).powi(2) + (sy / n - anchor.y).powi(2)).sqrt();
    if offset > CENTROID_TOL {
        return Err(invariant(format!("topos centroid {:.2e} m off the trajectory", offset)));
    }

    if (pose.topos.velocity.norm() - 1.0).abs() > ORTHONORMAL_TOL {
        return Err(invariant("topos velocity is not unit length".to_string()));
    }

    if pose.antennas.len() != body.mounts().len() {
        return Err(invariant(format!(
            "{} antenna frames for {} mounts",
            pose.antennas.len(),
            body.mounts().len()
        )));
    }
    if let Some((id, _)) = pose
        .antennas
        .iter()
        .find(|(_, f)| !f.origin.coords.iter().all(|v| v.is_finite()))
    {
        return Err(invariant(format!("antenna {} origin is not finite", id)));
    }

    Ok((ortho, offset))
}

/// World (tail, head) positions of every cylinder in a pose.
fn segments(body: &BodyModel, pose: &PoseSnapshot) -> Vec<(Point3<f64>, Point3<f64>)> {
    let samples = body.samples();
    body.skeleton()
        .cylinders()
        .filter_map(|(_, c)| {
            let tail = pose.topos.positions.get(samples.column_of(c.tail)?)?;
            let head = pose.topos.positions.get(samples.column_of(c.head)?)?;
            Some((*tail, *head))
        })
        .collect()
}
