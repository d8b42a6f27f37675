use anyhow::Result;

use crate::detect::backend::RectangleDetector;
use crate::frame::Frame;
use crate::geometry::RectangleFeature;

/// Detector that returns a fixed list of features for every frame.
///
/// With an empty list it turns the pipeline into a pass-through.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDetector {
    features: Vec<RectangleFeature>,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new(features: Vec<RectangleFeature>) -> Self {
        Self { features, calls: 0 }
    }

    /// Number of frames this detector has seen.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl RectangleDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RectangleFeature>> {
        self.calls += 1;
        Ok(self.features.clone())
    }
}
