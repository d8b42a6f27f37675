use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::geometry::RectangleFeature;

/// Detector effort level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    /// Analyse every pixel.
    #[default]
    High,
    /// Analyse a 2x downsampled frame; coordinates are scaled back.
    Low,
}

impl std::str::FromStr for Accuracy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Accuracy::High),
            "low" => Ok(Accuracy::Low),
            other => Err(anyhow!("unknown accuracy '{}' (expected high|low)", other)),
        }
    }
}

/// Rectangle detector tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub accuracy: Accuracy,
    /// Target long-side / short-side ratio.
    pub aspect_ratio: f32,
    /// Accepted relative deviation from `aspect_ratio`.
    pub aspect_tolerance: f32,
    /// Smallest accepted quad, as a fraction of the frame area.
    pub min_area_fraction: f32,
    pub max_features: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            aspect_ratio: 1.5,
            aspect_tolerance: 0.2,
            min_area_fraction: 0.005,
            max_features: 8,
        }
    }
}

impl DetectorOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(anyhow!("aspect_ratio must be a positive number"));
        }
        if !(self.aspect_tolerance > 0.0 && self.aspect_tolerance <= 1.0) {
            return Err(anyhow!("aspect_tolerance must be in (0, 1]"));
        }
        if !(0.0..1.0).contains(&self.min_area_fraction) {
            return Err(anyhow!("min_area_fraction must be in [0, 1)"));
        }
        if self.max_features == 0 {
            return Err(anyhow!("max_features must be at least 1"));
        }
        Ok(())
    }

    /// True when `ratio` (long / short) is close enough to the target.
    ///
    /// The target is folded to be >= 1 so 1.5 and 0.667 mean the same shape.
    pub fn accepts_aspect(&self, ratio: f32) -> bool {
        let target = if self.aspect_ratio < 1.0 {
            1.0 / self.aspect_ratio
        } else {
            self.aspect_ratio
        };
        ratio.is_finite() && ((ratio - target).abs() / target) <= self.aspect_tolerance
    }
}

/// Rectangle detector trait.
///
/// Implementations receive the whole frame and return quadrilaterals in
/// detection order. The frame must not be retained past the call.
pub trait RectangleDetector: Send {
    /// Detector identifier.
    fn name(&self) -> &'static str;

    /// Find rectangles in `frame`.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RectangleFeature>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
