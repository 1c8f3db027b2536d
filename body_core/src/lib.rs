//! Body Core - Motion-capture driven body geometry
//!
//! Turns a marker capture and a skeleton description into world-space body
//! poses that can be walked along arbitrary ground trajectories:
//! 1. **Skeleton + samples**: named markers joined by cylinders, positions per frame
//! 2. **Topos**: a captured frame re-based onto a trajectory point by an exact affine fit
//! 3. **Local frames**: one orthonormal basis per cylinder and per mounted antenna
//! 4. **Cycle stitching**: a canonical gait cycle laid along a polyline

pub mod antenna;
pub mod body;
pub mod centroid;
pub mod config;
pub mod cycle;
pub mod cylinder;
pub mod error;
pub mod motion;
pub mod skeleton;
pub mod topos;
pub mod trajectory;

// Re-export key types for convenience
pub use antenna::{AntennaFrame, AntennaMount, AntennaMounts, SurfacePoint};
pub use body::{BodyModel, BodyState, PoseSnapshot};
pub use centroid::CentroidTrack;
pub use config::{BodyConfig, CycleConfig, HeadingMode, LengthUnit};
pub use cycle::{stitch_along_trajectory, CycleSlice, StitchedWalk, WalkingCycle};
pub use cylinder::{change_basis, CylinderBasis, CylinderFrames, FrameSource};
pub use error::{BodyError, BodyResult, ConfigWarning, Validated};
pub use motion::{DecodedCapture, GraphLayout, MocapDecoder, MotionSamples};
pub use skeleton::{BodyDescription, Cylinder, CylinderId, MarkerId, SkeletonGraph};
pub use topos::{locate, Affine2, Topos, ToposLocation, ToposTransform};
pub use trajectory::{Trajectory, TrajectorySample};
