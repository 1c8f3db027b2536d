//! JSON exporter for walk playback.
//!
//! Exports per-tick body geometry as JSON for an external renderer.

use body_core::{BodyModel, CylinderBasis, PoseSnapshot};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A static cylinder of the skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CylinderExport {
    pub id: u32,
    pub tail: u32,
    pub head: u32,
    pub radius: f64,
}

/// Local basis of one cylinder at one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisExport {
    pub cylinder: u32,
    pub axis: [f64; 3],
    pub lateral: [f64; 3],
    pub normal: [f64; 3],
}

impl BasisExport {
    pub fn new(cylinder: u32, basis: &CylinderBasis) -> Self {
        Self {
            cylinder,
            axis: xyz(&basis.axis),
            lateral: xyz(&basis.lateral),
            normal: xyz(&basis.normal),
        }
    }
}

/// Antenna frame at one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntennaExport {
    pub id: String,
    pub origin: [f64; 3],
    pub axis: [f64; 3],
    pub lateral: [f64; 3],
    pub normal: [f64; 3],
}

/// A single tick of the walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkTick {
    /// Trajectory time in seconds
    pub time_sec: f64,

    /// Captured frame that was placed
    pub frame_index: usize,

    /// Marker positions, keyed by marker id
    pub markers: Vec<(u32, [f64; 3])>,

    pub bases: Vec<BasisExport>,

    pub antennas: Vec<AntennaExport>,
}

impl WalkTick {
    /// Flattens one pose of `body`.
    pub fn from_pose(body: &BodyModel, pose: &PoseSnapshot) -> Self {
        let markers = body
            .samples()
            .columns()
            .iter()
            .zip(&pose.topos.positions)
            .map(|(&id, p)| (id, [p.x, p.y, p.z]))
            .collect();
        let bases = pose
            .cylinders
            .iter()
            .map(|(id, basis)| BasisExport::new(id, basis))
            .collect();
        let antennas = pose
            .antennas
            .iter()
            .map(|(id, frame)| AntennaExport {
                id: id.clone(),
                origin: point(&frame.origin),
                axis: xyz(&frame.basis.axis),
                lateral: xyz(&frame.basis.lateral),
                normal: xyz(&frame.basis.normal),
            })
            .collect();

        Self {
            time_sec: pose.topos.time,
            frame_index: pose.topos.frame_index,
            markers,
            bases,
            antennas,
        }
    }
}

/// Complete walk export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Real-time length of one gait cycle (s)
    pub step_period: f64,

    /// Skeleton cylinders with radii
    pub cylinders: Vec<CylinderExport>,

    /// Ground trajectory polyline
    pub trajectory: Vec<[f64; 2]>,

    /// All ticks
    pub ticks: Vec<WalkTick>,

    /// Final results
    pub passed: bool,
}

impl WalkExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, step_period: f64, body: &BodyModel) -> Self {
        let cylinders = body
            .skeleton()
            .cylinders()
            .map(|(id, c)| CylinderExport {
                id,
                tail: c.tail,
                head: c.head,
                radius: c.radius,
            })
            .collect();
        Self {
            scenario: scenario.to_string(),
            seed,
            step_period,
            cylinders,
            trajectory: Vec::new(),
            ticks: Vec::new(),
            passed: false,
        }
    }

    /// Adds a tick.
    pub fn add_tick(&mut self, tick: WalkTick) {
        self.ticks.push(tick);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn xyz(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn point(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}
