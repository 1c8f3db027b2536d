//! Body model: owns the skeleton, the captured motion and the derived poses.
//!
//! Lifecycle: `Loaded → Centered → ToposSet` (re-entrant). Every operation
//! checks the state it needs and fails with [`BodyError::InvalidState`]
//! instead of working on half-initialized data.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use nalgebra::Point3;
use serde::Serialize;
use tracing::debug;

use crate::antenna::{derive_antenna_frames, AntennaFrame, AntennaMounts, SurfacePoint};
use crate::centroid::{center_samples, CentroidTrack};
use crate::config::BodyConfig;
use crate::cylinder::{endpoints, CylinderFrames, FrameSource};
use crate::error::{BodyError, BodyResult, Validated};
use crate::motion::{DecodedCapture, GraphLayout, MocapDecoder, MotionSamples};
use crate::skeleton::{BodyDescription, CylinderId, MarkerId, SkeletonGraph};
use crate::topos::Topos;
use crate::trajectory::Trajectory;

/// Lifecycle state of a [`BodyModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodyState {
    /// Capture loaded, positions absolute
    Loaded,
    /// Positions relative to the per-frame ground centroid
    Centered,
    /// A topos has been placed on a trajectory
    ToposSet,
}

/// Everything derived for one trajectory query.
#[derive(Debug, Clone, Serialize)]
pub struct PoseSnapshot {
    pub topos: Topos,
    pub cylinders: CylinderFrames,
    pub antennas: BTreeMap<String, AntennaFrame>,
}

/// A body model built from a description and one capture.
#[derive(Debug, Clone)]
pub struct BodyModel {
    source: String,
    config: BodyConfig,
    skeleton: SkeletonGraph,
    mounts: AntennaMounts,
    samples: MotionSamples,
    layout: GraphLayout,
    midpoint: MarkerId,
    state: BodyState,
    centroid: Option<CentroidTrack>,
    topos: Option<Topos>,
    cylinder_frames: Option<CylinderFrames>,
    antenna_frames: BTreeMap<String, AntennaFrame>,
}

impl BodyModel {
    /// Builds the skeleton, loads the capture and appends the hip midpoint.
    ///
    /// Skipped description entries come back as warnings; a missing marker
    /// label or a short capture is fatal.
    pub fn load(
        description: &BodyDescription,
        capture: &DecodedCapture,
        config: BodyConfig,
    ) -> BodyResult<Validated<Self>> {
        let Validated {
            value: (mut skeleton, mounts),
            warnings,
        } = SkeletonGraph::from_description(description);

        let mut samples = MotionSamples::from_capture(&skeleton, capture, &config)?;

        let [right, left] = &config.hip_markers;
        let hip = |name: &String| {
            skeleton
                .marker_id(name)
                .ok_or_else(|| BodyError::MissingMarker(name.clone()))
        };
        let (right, left) = (hip(right)?, hip(left)?);
        let midpoint = skeleton.extend_with_marker(&config.midpoint_label)?;
        samples.append_midpoint(midpoint, right, left)?;
        let layout = samples.layout();

        let source = capture
            .subjects
            .first()
            .map(|s| s.trim_end_matches(':').to_string())
            .unwrap_or_else(|| "<unnamed>".to_string());

        debug!(
            "Loaded body {}: {} markers, {} cylinders, {} antennas, {} frames",
            source,
            samples.marker_count(),
            skeleton.cylinder_count(),
            mounts.len(),
            samples.frame_count()
        );

        let model = Self {
            source,
            config,
            skeleton,
            mounts,
            samples,
            layout,
            midpoint,
            state: BodyState::Loaded,
            centroid: None,
            topos: None,
            cylinder_frames: None,
            antenna_frames: BTreeMap::new(),
        };
        Ok(Validated::new(model, warnings))
    }

    /// Parses a JSON description, then loads as [`BodyModel::load`].
    pub fn from_json(
        description: &str,
        capture: &DecodedCapture,
        config: BodyConfig,
    ) -> BodyResult<Validated<Self>> {
        let Validated {
            value: desc,
            warnings: mut parse_warnings,
        } = BodyDescription::from_json_str(description)?;
        let Validated { value, warnings } = Self::load(&desc, capture, config)?;
        parse_warnings.extend(warnings);
        Ok(Validated::new(value, parse_warnings))
    }

    /// Decodes `path` with `decoder` and loads it against a JSON description.
    pub fn from_decoder(
        description: &str,
        decoder: &impl MocapDecoder,
        path: &Path,
        config: BodyConfig,
    ) -> BodyResult<Validated<Self>> {
        let capture = decoder.decode(path)?;
        let mut loaded = Self::from_json(description, &capture, config)?;
        loaded.value.source = path.display().to_string();
        Ok(loaded)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Removes the per-frame ground centroid from every marker.
    pub fn center(&mut self) -> BodyResult<&CentroidTrack> {
        self.require(&[BodyState::Loaded], "center")?;
        let track = center_samples(&mut self.samples);
        self.state = BodyState::Centered;
        Ok(self.centroid.insert(track))
    }

    /// Places the captured frame selected by `t` on `trajectory`.
    ///
    /// On failure the previous topos, if any, is kept. Cylinder and antenna
    /// frames derived from the previous topos are dropped on success.
    pub fn set_topos(
        &mut self,
        trajectory: &Trajectory,
        t: f64,
        cycle_duration: f64,
    ) -> BodyResult<&Topos> {
        self.require(&[BodyState::Centered, BodyState::ToposSet], "set_topos")?;
        let centroid = self
            .centroid
            .as_ref()
            .ok_or_else(|| BodyError::invalid_state("centered body has no centroid track"))?;
        let topos = Topos::compute(&self.samples, centroid, trajectory, t, cycle_duration)?;

        if matches!(&self.cylinder_frames, Some(f) if f.source == FrameSource::Topos) {
            self.cylinder_frames = None;
            self.antenna_frames.clear();
        }
        self.state = BodyState::ToposSet;
        Ok(self.topos.insert(topos))
    }

    /// Computes every cylinder basis for a captured frame or the topos.
    pub fn set_cylinder_frames(&mut self, source: FrameSource) -> BodyResult<&CylinderFrames> {
        let velocity = match source {
            FrameSource::Captured(k) => {
                self.require(&[BodyState::Centered, BodyState::ToposSet], "captured cylinder frames")?;
                self.centroid
                    .as_ref()
                    .and_then(|c| c.velocity(k))
                    .copied()
                    .ok_or_else(|| self.samples_frame_error(k))?
            }
            FrameSource::Topos => {
                self.require(&[BodyState::ToposSet], "topos cylinder frames")?;
                self.current_topos()?.velocity
            }
        };
        let positions = self.positions_for(source)?;
        let frames = CylinderFrames::build(
            &self.skeleton,
            positions,
            |id| self.samples.column_of(id),
            &velocity,
            source,
        )?;
        self.antenna_frames.clear();
        Ok(self.cylinder_frames.insert(frames))
    }

    /// Re-bases the current cylinder frames onto captured frame `k`.
    pub fn carry_cylinder_frames(&mut self, k: usize) -> BodyResult<&CylinderFrames> {
        let current = self.current_cylinder_frames()?;
        let positions = self.samples.frame(k)?;
        let carried =
            current.carried_to_frame(&self.skeleton, positions, |id| self.samples.column_of(id), k)?;
        self.antenna_frames.clear();
        Ok(self.cylinder_frames.insert(carried))
    }

    /// Derives every declared antenna frame from the current cylinder frames.
    pub fn set_antenna_frames(&mut self) -> BodyResult<&BTreeMap<String, AntennaFrame>> {
        let frames = self.current_cylinder_frames()?;
        let positions = self.positions_for(frames.source)?;
        let derived = derive_antenna_frames(
            &self.skeleton,
            &self.mounts,
            frames,
            positions,
            |id| self.samples.column_of(id),
        )?;
        self.antenna_frames = derived;
        Ok(&self.antenna_frames)
    }

    /// Point on the surface of `cylinder` at `source`.
    ///
    /// Uses the current cylinder basis when `source` matches it, and carries
    /// the basis to the requested captured frame otherwise.
    pub fn surface_point(
        &self,
        cylinder: CylinderId,
        length: f64,
        angle: f64,
        source: FrameSource,
    ) -> BodyResult<SurfacePoint> {
        let frames = self.current_cylinder_frames()?;
        let segment = self
            .skeleton
            .cylinder(cylinder)
            .ok_or(BodyError::UnknownCylinder(cylinder))?;
        let basis = frames
            .get(cylinder)
            .ok_or(BodyError::UnknownCylinder(cylinder))?;

        let positions = self.positions_for(source)?;
        let (tail, head) = endpoints(
            positions,
            |id| self.samples.column_of(id),
            segment.tail,
            segment.head,
        )?;
        let basis = if source == frames.source {
            *basis
        } else {
            basis.carried_to(&(head - tail))?
        };
        Ok(SurfacePoint::on_cylinder(
            cylinder,
            &tail,
            &basis,
            segment.radius,
            length,
            angle,
        ))
    }

    /// Walks the body along `trajectory`, one full pose per query time.
    ///
    /// Stops at the first failing time; the model keeps the last good pose.
    pub fn topos_sequence(
        &mut self,
        trajectory: &Trajectory,
        times: &[f64],
        cycle_duration: f64,
    ) -> BodyResult<Vec<PoseSnapshot>> {
        let mut snapshots = Vec::with_capacity(times.len());
        for &t in times {
            let topos = self.set_topos(trajectory, t, cycle_duration)?.clone();
            let cylinders = self.set_cylinder_frames(FrameSource::Topos)?.clone();
            let antennas = self.set_antenna_frames()?.clone();
            snapshots.push(PoseSnapshot {
                topos,
                cylinders,
                antennas,
            });
        }
        debug!("Computed {} poses along the trajectory", snapshots.len());
        Ok(snapshots)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn state(&self) -> BodyState {
        self.state
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &BodyConfig {
        &self.config
    }

    pub fn skeleton(&self) -> &SkeletonGraph {
        &self.skeleton
    }

    pub fn mounts(&self) -> &AntennaMounts {
        &self.mounts
    }

    pub fn samples(&self) -> &MotionSamples {
        &self.samples
    }

    pub fn layout(&self) -> &GraphLayout {
        &self.layout
    }

    /// Id of the synthetic hip midpoint marker.
    pub fn midpoint(&self) -> MarkerId {
        self.midpoint
    }

    pub fn centroid(&self) -> Option<&CentroidTrack> {
        self.centroid.as_ref()
    }

    pub fn topos(&self) -> Option<&Topos> {
        self.topos.as_ref()
    }

    pub fn cylinder_frames(&self) -> Option<&CylinderFrames> {
        self.cylinder_frames.as_ref()
    }

    pub fn antenna_frames(&self) -> &BTreeMap<String, AntennaFrame> {
        &self.antenna_frames
    }

    pub fn is_centered(&self) -> bool {
        self.state != BodyState::Loaded
    }

    /// Marker positions the given source refers to.
    pub fn positions_for(&self, source: FrameSource) -> BodyResult<&[Point3<f64>]> {
        match source {
            FrameSource::Captured(k) => self.samples.frame(k),
            FrameSource::Topos => Ok(&self.current_topos()?.positions),
        }
    }

    fn current_topos(&self) -> BodyResult<&Topos> {
        self.topos
            .as_ref()
            .ok_or_else(|| BodyError::invalid_state("no topos has been set"))
    }

    fn current_cylinder_frames(&self) -> BodyResult<&CylinderFrames> {
        self.cylinder_frames
            .as_ref()
            .ok_or_else(|| BodyError::invalid_state("cylinder frames have not been computed"))
    }

    fn require(&self, allowed: &[BodyState], operation: &str) -> BodyResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BodyError::invalid_state(format!(
                "{} needs state {:?}, body is {:?}",
                operation, allowed, self.state
            )))
        }
    }

    fn samples_frame_error(&self, k: usize) -> BodyError {
        BodyError::shape(format!(
            "frame {} out of range (0..{})",
            k,
            self.samples.frame_count()
        ))
    }
}

impl fmt::Display for BodyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} frames, {} markers, centered: {}, topos: {}",
            self.source,
            self.samples.frame_count(),
            self.samples.marker_count(),
            self.is_centered(),
            self.topos.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectorySample;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Vector3};

    const DESCRIPTION: &str = r#"{
        "nodes": { "0": "RFWT", "1": "LFWT", "2": "RKNE", "3": "LKNE", "4": "BOTT" },
        "cylinder": {
            "0": { "tail": 0, "head": 2, "radius": 0.07 },
            "1": { "tail": 1, "head": 3, "radius": 0.07 }
        },
        "antenna": {
            "HIPR": { "cylinder": 0, "length": 0.2, "height": 0.07, "angle": 0.0 }
        }
    }"#;

    /// Hips and knees walking along +x by 1 cm per frame, in centimeters.
    fn capture(frames: usize) -> DecodedCapture {
        let labels = ["RFWT", "LFWT", "RKNE", "LKNE"];
        DecodedCapture {
            subjects: vec!["John:".to_string()],
            point_labels: labels.iter().map(|l| format!("John:{}", l)).collect(),
            frames: (0..frames)
                .map(|k| {
                    let x = k as f64;
                    vec![
                        Point3::new(x, -10.0, 100.0),
                        Point3::new(x, 10.0, 100.0),
                        Point3::new(x + 5.0, -10.0, 50.0),
                        Point3::new(x - 5.0, 10.0, 50.0),
                    ]
                })
                .collect(),
        }
    }

    fn model() -> BodyModel {
        let config = BodyConfig::default().with_frame_count(10);
        let loaded = BodyModel::from_json(DESCRIPTION, &capture(12), config).unwrap();
        assert!(loaded.is_clean());
        loaded.value
    }

    fn path() -> Trajectory {
        let samples = (0..=100)
            .map(|k| {
                let t = k as f64 * 0.1;
                TrajectorySample { t, x: 0.0, y: 0.5 * t, vx: 0.0, vy: 1.0 }
            })
            .collect();
        Trajectory::new(samples).unwrap()
    }

    #[test]
    fn test_load_appends_midpoint() {
        let body = model();
        assert_eq!(body.state(), BodyState::Loaded);
        assert_eq!(body.samples().frame_count(), 10);
        assert_eq!(body.samples().marker_count(), 5);
        assert_eq!(body.midpoint(), 4);

        let mid = body.samples().position(4, 3).unwrap();
        assert_relative_eq!(mid, Point3::new(0.03, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(*body.layout().get(4).unwrap(), Point2::new(0.0, 1.0), epsilon = 1e-12);
        assert_eq!(body.mounts().len(), 1);
    }

    #[test]
    fn test_missing_marker_is_fatal() {
        let mut short = capture(12);
        short.point_labels[3] = "John:XXXX".to_string();
        let err = BodyModel::from_json(DESCRIPTION, &short, BodyConfig::default().with_frame_count(10))
            .unwrap_err();
        assert!(matches!(err, BodyError::MissingMarker(ref l) if l == "John:LKNE"));
    }

    #[test]
    fn test_state_gating() {
        let mut body = model();
        let traj = path();

        assert!(matches!(body.set_topos(&traj, 1.0, 1.0), Err(BodyError::InvalidState(_))));
        assert!(matches!(body.set_cylinder_frames(FrameSource::Captured(0)), Err(BodyError::InvalidState(_))));
        assert!(matches!(body.set_antenna_frames(), Err(BodyError::InvalidState(_))));

        body.center().unwrap();
        assert_eq!(body.state(), BodyState::Centered);
        assert!(matches!(body.center(), Err(BodyError::InvalidState(_))));
        assert!(matches!(body.set_cylinder_frames(FrameSource::Topos), Err(BodyError::InvalidState(_))));
    }

    #[test]
    fn test_captured_frames_and_antennas() {
        let mut body = model();
        body.center().unwrap();

        let frames = body.set_cylinder_frames(FrameSource::Captured(0)).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.max_orthonormality_error() < 1e-12);

        let accs = body.set_antenna_frames().unwrap();
        let hip = &accs["HIPR"];
        assert!(hip.origin.coords.iter().all(|v| v.is_finite()));
        assert_relative_eq!(hip.basis.lateral.dot(&hip.basis.axis), 0.0, epsilon = 1e-12);

        let carried = body.carry_cylinder_frames(5).unwrap();
        assert_eq!(carried.source, FrameSource::Captured(5));
        assert!(body.antenna_frames().is_empty());
    }

    #[test]
    fn test_failed_topos_keeps_previous() {
        let mut body = model();
        body.center().unwrap();
        let traj = path();

        let first = body.set_topos(&traj, 2.35, 1.0).unwrap().clone();
        assert_eq!(body.state(), BodyState::ToposSet);
        assert_relative_eq!(first.velocity, Vector3::y(), epsilon = 1e-12);

        let err = body.set_topos(&traj, 42.0, 1.0).unwrap_err();
        assert!(matches!(err, BodyError::TemporalRange { .. }));
        let kept = body.topos().unwrap();
        assert_eq!(kept.time, first.time);
        assert_eq!(kept.sample_index, first.sample_index);
    }

    #[test]
    fn test_new_topos_drops_topos_frames_only() {
        let mut body = model();
        body.center().unwrap();
        let traj = path();

        body.set_topos(&traj, 2.35, 1.0).unwrap();
        body.set_cylinder_frames(FrameSource::Topos).unwrap();
        assert_eq!(body.set_antenna_frames().unwrap().len(), 1);

        body.set_topos(&traj, 3.35, 1.0).unwrap();
        assert!(body.cylinder_frames().is_none());
        assert!(body.antenna_frames().is_empty());

        body.set_cylinder_frames(FrameSource::Captured(2)).unwrap();
        body.set_antenna_frames().unwrap();
        body.set_topos(&traj, 4.35, 1.0).unwrap();
        assert_eq!(body.cylinder_frames().unwrap().source, FrameSource::Captured(2));
        assert_eq!(body.antenna_frames().len(), 1);
    }

    #[test]
    fn test_topos_sequence_walks_the_path() {
        let mut body = model();
        body.center().unwrap();
        let traj = path();

        let times = [0.55, 1.05, 2.35, 7.95];
        let poses = body.topos_sequence(&traj, &times, 1.0).unwrap();
        assert_eq!(poses.len(), 4);

        for pose in &poses {
            let anchor = traj.position(pose.topos.sample_index).unwrap();
            let n = pose.topos.positions.len() as f64;
            let cx = pose.topos.positions.iter().map(|p| p.x).sum::<f64>() / n;
            let cy = pose.topos.positions.iter().map(|p| p.y).sum::<f64>() / n;
            assert_relative_eq!(cx, anchor.x, epsilon = 1e-9);
            assert_relative_eq!(cy, anchor.y, epsilon = 1e-9);

            assert_eq!(pose.cylinders.source, FrameSource::Topos);
            assert!(pose.cylinders.max_orthonormality_error() < 1e-12);
            assert!(pose.antennas.contains_key("HIPR"));
        }
    }

    #[test]
    fn test_surface_point_on_other_frame() {
        let mut body = model();
        body.center().unwrap();
        body.set_cylinder_frames(FrameSource::Captured(0)).unwrap();

        let here = body.surface_point(0, 0.1, 0.0, FrameSource::Captured(0)).unwrap();
        let there = body.surface_point(0, 0.1, 0.0, FrameSource::Captured(4)).unwrap();

        let tail0 = body.samples().position(0, 0).unwrap();
        let tail4 = body.samples().position(0, 4).unwrap();
        assert_relative_eq!((here.position - tail0).norm(), (there.position - tail4).norm(), epsilon = 1e-12);
        assert!(matches!(
            body.surface_point(0, 0.1, 0.0, FrameSource::Topos),
            Err(BodyError::InvalidState(_))
        ));
        assert!(matches!(body.surface_point(9, 0.1, 0.0, FrameSource::Captured(0)), Err(BodyError::UnknownCylinder(9))));
    }

    #[test]
    fn test_display_summary() {
        let mut body = model();
        assert_eq!(body.to_string(), "John: 10 frames, 5 markers, centered: false, topos: false");
        body.center().unwrap();
        assert!(body.to_string().contains("centered: true"));
    }
}
