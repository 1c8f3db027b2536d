//! Body Sim - deterministic walk synthesis harness for `body_core`
//!
//! Synthesizes a seeded gait capture for the built-in body, walks it along
//! named ground trajectories and checks the geometric invariants of every
//! pose (basis orthonormality, centroid placement, finite antenna frames).
//!
//! # Usage
//!
//! ```ignore
//! use body_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(5.0)
//!     .run(ScenarioId::Circle);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod gait;
mod runner;
mod visualizer;
pub mod scenarios;

pub use error::{SimError, SimResult};
pub use exporter::{AntennaExport, BasisExport, CylinderExport, WalkExport, WalkTick};
pub use gait::{GaitSynthesizer, SUBJECT};
pub use runner::{RunMetrics, ScenarioResult, ScenarioRunner, StitchReport, JOHN};
pub use scenarios::ScenarioId;
pub use visualizer::RerunLogger;
