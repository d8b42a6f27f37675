//! Rectangle detection.
//!
//! - `RectangleDetector`: the detector seam; takes a frame, returns quads.
//! - `ContourDetector`: CPU detector tuned by `DetectorOptions`.
//! - `ScriptedDetector`: fixed output, for tests and pass-through runs.
//! - `DetectorRegistry`: named detectors with a default.

mod backend;
mod backends;
mod registry;

pub use backend::{Accuracy, DetectorOptions, RectangleDetector};
pub use backends::{ContourDetector, ScriptedDetector};
pub use registry::{DetectorRegistry, SharedDetector};
