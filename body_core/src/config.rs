//! Configuration for loading a body model and composing walking cycles.

use serde::{Deserialize, Serialize};

use crate::error::{BodyError, BodyResult};

/// Length unit of a decoded capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Meters,
    Centimeters,
    Millimeters,
}

impl LengthUnit {
    /// Multiplier converting this unit to meters.
    pub fn to_meters(self) -> f64 {
        match self {
            LengthUnit::Meters => 1.0,
            LengthUnit::Centimeters => 0.01,
            LengthUnit::Millimeters => 0.001,
        }
    }
}

/// Configuration for [`crate::BodyModel::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Number of captured frames kept (default: 126, one two-step gait cycle)
    pub frame_count: usize,

    /// Unit of the decoded capture (default: centimeters)
    pub unit: LengthUnit,

    /// Label of the synthetic hip midpoint marker. A declared node with this
    /// name is skipped while loading the capture and receives the midpoint.
    pub midpoint_label: String,

    /// Names of the two hip markers averaged into the midpoint
    pub hip_markers: [String; 2],
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            frame_count: 126,
            unit: LengthUnit::Centimeters,
            midpoint_label: "BOTT".to_string(),
            hip_markers: ["RFWT".to_string(), "LFWT".to_string()],
        }
    }
}

impl BodyConfig {
    /// Reads a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> BodyResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn with_unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }
}

/// How the stitching rotation between the body-forward reference and a
/// trajectory segment is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMode {
    /// Signed angle in (-π, π], counter-clockwise positive
    Signed,
    /// Arccosine of the dot product, in [0, π]; turns to the right come out
    /// as turns to the left
    Unsigned,
}

/// Configuration for the cycle compositor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Ground distance covered by one reference cycle (default: 140 units)
    pub reference_distance: f64,

    /// Frames needed to cover `reference_distance` (default: 126)
    pub reference_frames: usize,

    /// Marker columns of the right and left shoulder in the cycle array.
    /// The body-forward reference is horizontal and perpendicular to the
    /// shoulder line at frame 0.
    pub shoulder_columns: [usize; 2],

    pub heading: HeadingMode,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            reference_distance: 140.0,
            reference_frames: 126,
            shoulder_columns: [3, 4],
            heading: HeadingMode::Signed,
        }
    }
}

impl CycleConfig {
    /// Rejects reference values that cannot map distances to frames.
    pub fn validate(&self) -> BodyResult<()> {
        if !(self.reference_distance.is_finite() && self.reference_distance > 0.0) {
            return Err(BodyError::shape(format!(
                "cycle reference distance must be positive and finite, got {}",
                self.reference_distance
            )));
        }
        if self.reference_frames == 0 {
            return Err(BodyError::shape("cycle reference frame count must be non-zero"));
        }
        Ok(())
    }

    /// Number of cycle frames consumed by a segment of the given length.
    pub fn frames_for_distance(&self, distance: f64) -> usize {
        (distance * self.reference_frames as f64 / self.reference_distance).floor() as usize
    }

    /// Ground distance advanced per frame.
    pub fn advance_per_frame(&self) -> f64 {
        self.reference_distance / self.reference_frames as f64
    }
}
