//! Procedural gait capture for the built-in 15-marker body.
//!
//! Produces one two-step walking cycle along +x in centimeters, labeled the
//! way a motion-capture decoder would (`"John:RKNE"`, ...). Marker noise is
//! drawn from a seeded RNG so every run is reproducible.

use std::f64::consts::TAU;
use std::path::Path;

use body_core::{BodyError, BodyResult, DecodedCapture, MocapDecoder};
use nalgebra::{Point3, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Subject prefix of every synthesized label.
pub const SUBJECT: &str = "John:";

/// Rest pose (meters, facing +x, left = +y) and forward swing amplitude.
const MARKERS: [(&str, [f64; 3], f64); 15] = [
    ("STRN", [0.05, 0.0, 1.30], 0.0),
    ("CLAV", [0.03, 0.0, 1.45], 0.0),
    ("RFHD", [0.08, -0.05, 1.70], 0.0),
    ("RSHO", [0.0, -0.20, 1.45], 0.0),
    ("LSHO", [0.0, 0.20, 1.45], 0.0),
    ("RELB", [0.0, -0.24, 1.15], -0.08),
    ("LELB", [0.0, 0.24, 1.15], 0.08),
    ("RWRB", [0.02, -0.25, 0.88], -0.15),
    ("LWRB", [0.02, 0.25, 0.88], 0.15),
    ("RFWT", [0.08, -0.13, 1.00], 0.0),
    ("LFWT", [0.08, 0.13, 1.00], 0.0),
    ("RKNE", [0.05, -0.11, 0.52], 0.15),
    ("LKNE", [0.05, 0.11, 0.52], -0.15),
    ("RANK", [0.0, -0.10, 0.10], 0.30),
    ("LANK", [0.0, 0.10, 0.10], -0.30),
];

/// Deterministic synthetic walker.
#[derive(Debug, Clone)]
pub struct GaitSynthesizer {
    /// Frames per two-step cycle
    frames: usize,

    /// Ground distance covered by one cycle (m)
    cycle_length: f64,

    /// Vertical bob amplitude (m)
    bob: f64,

    /// Marker noise standard deviation (cm)
    noise_cm: f64,

    seed: u64,
}

impl GaitSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            frames: 126,
            cycle_length: 1.4,
            bob: 0.02,
            noise_cm: 0.0,
            seed,
        }
    }

    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the Gaussian marker noise (cm).
    pub fn with_noise(mut self, std_dev_cm: f64) -> Self {
        self.noise_cm = std_dev_cm;
        self
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn cycle_length(&self) -> f64 {
        self.cycle_length
    }

    /// Marker names in capture column order.
    pub fn marker_names() -> impl Iterator<Item = &'static str> {
        MARKERS.iter().map(|(name, _, _)| *name)
    }

    /// Synthesizes one cycle.
    pub fn synthesize(&self) -> BodyResult<DecodedCapture> {
        let noise_error = |reason: String| BodyError::ConfigParse {
            section: "gait".to_string(),
            key: "noise".to_string(),
            reason,
        };
        if !(self.noise_cm >= 0.0 && self.noise_cm.is_finite()) {
            return Err(noise_error(format!(
                "standard deviation must be finite and non-negative, got {}",
                self.noise_cm
            )));
        }
        let normal = Normal::new(0.0, self.noise_cm).map_err(|e| noise_error(e.to_string()))?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let frames = (0..self.frames)
            .map(|k| {
                let phase = TAU * k as f64 / self.frames as f64;
                let advance = self.cycle_length * k as f64 / self.frames as f64;
                let lift = self.bob * (2.0 * phase).cos();

                MARKERS
                    .iter()
                    .map(|(_, rest, swing)| {
                        let p = Vector3::new(
                            rest[0] + advance + swing * phase.sin(),
                            rest[1],
                            rest[2] + lift,
                        ) * 100.0;
                        let noise = if self.noise_cm > 0.0 {
                            Vector3::new(
                                normal.sample(&mut rng),
                                normal.sample(&mut rng),
                                normal.sample(&mut rng),
                            )
                        } else {
                            Vector3::zeros()
                        };
                        Point3::from(p + noise)
                    })
                    .collect()
            })
            .collect();

        Ok(DecodedCapture {
            subjects: vec![SUBJECT.to_string()],
            point_labels: Self::marker_names()
                .map(|name| format!("{}{}", SUBJECT, name))
                .collect(),
            frames,
        })
    }
}

impl MocapDecoder for GaitSynthesizer {
    /// The source path is only used for logging; the capture is synthesized.
    fn decode(&self, source: &Path) -> BodyResult<DecodedCapture> {
        tracing::debug!("Synthesizing gait cycle for {}", source.display());
        self.synthesize()
    }
}
