//! Motion sample store: per-frame 3D marker positions in meters.
//!
//! Conceptually a dense (axis, marker, frame) array. It is stored frame-major
//! (`frames[k][column]`) because every consumer works on whole frames.

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BodyConfig;
use crate::error::{BodyError, BodyResult};
use crate::skeleton::{MarkerId, SkeletonGraph};

/// Output of an external motion-capture decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodedCapture {
    /// Subject names; the first one prefixes every point label
    pub subjects: Vec<String>,

    /// Label of each point column
    pub point_labels: Vec<String>,

    /// frames × points positions, in the capture's own unit
    pub frames: Vec<Vec<Point3<f64>>>,
}

impl DecodedCapture {
    /// Checks that every frame has one position per label.
    pub fn validate(&self) -> BodyResult<()> {
        let points = self.point_labels.len();
        if let Some((k, frame)) = self
            .frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != points)
        {
            return Err(BodyError::shape(format!(
                "capture frame {} has {} points, expected {}",
                k,
                frame.len(),
                points
            )));
        }
        Ok(())
    }

    /// Label under which the marker `name` is stored.
    pub fn label_for(&self, name: &str) -> String {
        match self.subjects.first() {
            Some(subject) => format!("{}{}", subject, name),
            None => name.to_string(),
        }
    }

    pub fn point_index(&self, label: &str) -> Option<usize> {
        self.point_labels.iter().position(|l| l == label)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Decodes a motion-capture container into labeled point trajectories.
pub trait MocapDecoder {
    fn decode(&self, source: &Path) -> BodyResult<DecodedCapture>;
}

/// Display coordinates of the markers, taken once from the first loaded frame.
///
/// Kept apart from the skeleton topology and never updated by centering or
/// topos changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphLayout {
    positions: BTreeMap<MarkerId, Point2<f64>>,
}

impl GraphLayout {
    pub fn get(&self, id: MarkerId) -> Option<&Point2<f64>> {
        self.positions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MarkerId, &Point2<f64>)> {
        self.positions.iter().map(|(&id, p)| (id, p))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Marker positions for every captured frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSamples {
    /// Marker id of each column
    columns: Vec<MarkerId>,

    /// frames × columns, meters
    frames: Vec<Vec<Point3<f64>>>,
}

impl MotionSamples {
    /// Builds samples from explicit columns and frames.
    pub fn from_frames(columns: Vec<MarkerId>, frames: Vec<Vec<Point3<f64>>>) -> BodyResult<Self> {
        if let Some((k, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != columns.len())
        {
            return Err(BodyError::shape(format!(
                "frame {} has {} markers, expected {}",
                k,
                frame.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, frames })
    }

    /// Stacks the skeleton's markers out of a decoded capture.
    ///
    /// Markers are taken in ascending id order, skipping the midpoint label
    /// (it is synthesized afterwards). The first `config.frame_count` frames
    /// are kept and converted to meters.
    pub fn from_capture(
        skeleton: &SkeletonGraph,
        capture: &DecodedCapture,
        config: &BodyConfig,
    ) -> BodyResult<Self> {
        capture.validate()?;
        if capture.frame_count() < config.frame_count {
            return Err(BodyError::shape(format!(
                "capture holds {} frames, {} requested",
                capture.frame_count(),
                config.frame_count
            )));
        }

        let mut columns = Vec::new();
        let mut sources = Vec::new();
        for (id, name) in skeleton.markers() {
            if name == config.midpoint_label {
                continue;
            }
            let label = capture.label_for(name);
            let index = capture
                .point_index(&label)
                .ok_or(BodyError::MissingMarker(label))?;
            columns.push(id);
            sources.push(index);
        }

        let scale = config.unit.to_meters();
        let frames = capture.frames[..config.frame_count]
            .iter()
            .map(|frame| {
                sources
                    .iter()
                    .map(|&i| Point3::from(frame[i].coords * scale))
                    .collect()
            })
            .collect();

        debug!(
            "Loaded {} markers x {} frames (scale {})",
            columns.len(),
            config.frame_count,
            scale
        );

        Ok(Self { columns, frames })
    }

    /// Appends marker `id` as the per-frame midpoint of markers `a` and `b`.
    pub fn append_midpoint(&mut self, id: MarkerId, a: MarkerId, b: MarkerId) -> BodyResult<()> {
        if self.column_of(id).is_some() {
            return Err(BodyError::shape(format!("marker {} already has samples", id)));
        }
        let ca = self.column_of(a).ok_or(BodyError::UnknownMarker(a))?;
        let cb = self.column_of(b).ok_or(BodyError::UnknownMarker(b))?;

        for frame in &mut self.frames {
            let mid = nalgebra::center(&frame[ca], &frame[cb]);
            frame.push(mid);
        }
        self.columns.push(id);
        Ok(())
    }

    /// Display layout from the lateral/vertical (y, z) components of frame 0.
    pub fn layout(&self) -> GraphLayout {
        let positions = match self.frames.first() {
            Some(first) => self
                .columns
                .iter()
                .zip(first)
                .map(|(&id, p)| (id, Point2::new(p.y, p.z)))
                .collect(),
            None => BTreeMap::new(),
        };
        GraphLayout { positions }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn marker_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[MarkerId] {
        &self.columns
    }

    pub fn column_of(&self, id: MarkerId) -> Option<usize> {
        self.columns.iter().position(|&c| c == id)
    }

    /// All marker positions at frame `k`, in column order.
    pub fn frame(&self, k: usize) -> BodyResult<&[Point3<f64>]> {
        self.frames
            .get(k)
            .map(Vec::as_slice)
            .ok_or_else(|| self.frame_out_of_range(k))
    }

    pub fn frames(&self) -> &[Vec<Point3<f64>>] {
        &self.frames
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Vec<Point3<f64>>] {
        &mut self.frames
    }

    pub fn position(&self, id: MarkerId, k: usize) -> BodyResult<Point3<f64>> {
        let column = self.column_of(id).ok_or(BodyError::UnknownMarker(id))?;
        Ok(self.frame(k)?[column])
    }

    /// Positions of one marker over all frames.
    pub fn trajectory_of(&self, id: MarkerId) -> BodyResult<Vec<Point3<f64>>> {
        let column = self.column_of(id).ok_or(BodyError::UnknownMarker(id))?;
        Ok(self.frames.iter().map(|frame| frame[column]).collect())
    }

    /// Element (axis, column, frame) of the dense array view.
    pub fn axis_value(&self, axis: usize, column: usize, k: usize) -> BodyResult<f64> {
        if axis > 2 {
            return Err(BodyError::shape(format!("axis {} out of range 0..3", axis)));
        }
        self.frame(k)?
            .get(column)
            .map(|p| p[axis])
            .ok_or_else(|| BodyError::shape(format!("column {} out of range", column)))
    }

    fn frame_out_of_range(&self, k: usize) -> BodyError {
        BodyError::shape(format!("frame {} out of range 0..{}", k, self.frames.len()))
    }
}
