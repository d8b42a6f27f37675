//! Daemon configuration.
//!
//! Read from the JSON file named by `OVERLAY_CAMERA_CONFIG` (all fields
//! optional), then overridden by `OVERLAY_CAMERA_*` environment variables
//! and validated.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{Accuracy, DetectorOptions};
use crate::ingest::SourceConfig;
use crate::overlay::OverlayOptions;

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_FPS: u32 = 15;
const DEFAULT_DETECTOR: &str = "contour";
const DEFAULT_DISPLAY_WIDTH: f32 = 375.0;
const DEFAULT_DISPLAY_HEIGHT: f32 = 667.0;
const DEFAULT_DISPLAY_SCALE: f32 = 2.0;

#[derive(Debug, Deserialize, Default)]
struct OverlayCameraConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayOptions>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    accuracy: Option<Accuracy>,
    aspect_ratio: Option<f32>,
    aspect_tolerance: Option<f32>,
    min_area_fraction: Option<f32>,
    max_features: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    scale: Option<f32>,
    output_dir: Option<PathBuf>,
    every_nth: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct OverlayCameraConfig {
    pub camera: SourceConfig,
    /// Registered detector name.
    pub detector_backend: String,
    pub detector: DetectorOptions,
    pub overlay: OverlayOptions,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// Logical width in points.
    pub width: f32,
    /// Logical height in points.
    pub height: f32,
    /// Backing-store pixels per point.
    pub scale: f32,
    /// When set, presented frames are written here as PNG.
    pub output_dir: Option<PathBuf>,
    pub every_nth: u64,
}

impl OverlayCameraConfig {
    /// Load from `OVERLAY_CAMERA_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OVERLAY_CAMERA_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayCameraConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = SourceConfig {
            uri: camera_file
                .source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_FPS),
        };

        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorOptions::default();
        let detector = DetectorOptions {
            accuracy: detector_file.accuracy.unwrap_or(defaults.accuracy),
            aspect_ratio: detector_file.aspect_ratio.unwrap_or(defaults.aspect_ratio),
            aspect_tolerance: detector_file
                .aspect_tolerance
                .unwrap_or(defaults.aspect_tolerance),
            min_area_fraction: detector_file
                .min_area_fraction
                .unwrap_or(defaults.min_area_fraction),
            max_features: detector_file.max_features.unwrap_or(defaults.max_features),
        };
        let detector_backend = detector_file
            .backend
            .unwrap_or_else(|| DEFAULT_DETECTOR.to_string());

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            width: display_file.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
            height: display_file.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            scale: display_file.scale.unwrap_or(DEFAULT_DISPLAY_SCALE),
            output_dir: display_file.output_dir,
            every_nth: display_file.every_nth.unwrap_or(1),
        };

        Self {
            camera,
            detector_backend,
            detector,
            overlay: file.overlay.unwrap_or_default(),
            display,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("OVERLAY_CAMERA_SOURCE") {
            if !source.trim().is_empty() {
                self.camera.uri = source;
            }
        }
        if let Ok(fps) = std::env::var("OVERLAY_CAMERA_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("OVERLAY_CAMERA_FPS must be an integer frame rate"))?;
        }
        if let Ok(ratio) = std::env::var("OVERLAY_CAMERA_ASPECT_RATIO") {
            self.detector.aspect_ratio = ratio
                .trim()
                .parse()
                .map_err(|_| anyhow!("OVERLAY_CAMERA_ASPECT_RATIO must be a number"))?;
        }
        if let Ok(dir) = std::env::var("OVERLAY_CAMERA_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.display.output_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.detector_backend.trim().is_empty() {
            return Err(anyhow!("detector backend must not be empty"));
        }
        self.detector.validate()?;
        if let Some(block) = self.overlay.pixelate {
            if block < 2 {
                return Err(anyhow!("overlay pixelate block must be at least 2"));
            }
        }
        let d = &self.display;
        if !(d.width > 0.0 && d.height > 0.0 && d.scale > 0.0) {
            return Err(anyhow!("display width, height and scale must be positive"));
        }
        if d.every_nth == 0 {
            return Err(anyhow!("display every_nth must be at least 1"));
        }
        Ok(())
    }
}

impl Default for OverlayCameraConfig {
    fn default() -> Self {
        Self::from_file(OverlayCameraConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<OverlayCameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_target_cards() {
        let cfg = OverlayCameraConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.camera.uri, DEFAULT_SOURCE);
        assert_eq!(cfg.detector.accuracy, Accuracy::High);
        assert_eq!(cfg.detector.aspect_ratio, 1.5);
        assert_eq!(cfg.detector_backend, "contour");
    }

    #[test]
    fn validation_catches_bad_display_and_pixelate() {
        let mut cfg = OverlayCameraConfig::default();
        cfg.display.scale = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayCameraConfig::default();
        cfg.overlay.pixelate = Some(1);
        assert!(cfg.validate().is_err());
    }
}
