//! Frame capture sources.
//!
//! This module provides the sources a capture session can pull frames from:
//! - Synthetic scenes (`stub://...`), always available
//! - Still images or image directories (`file://...` or a bare path)
//! - USB/V4L2 cameras (`/dev/videoN`, feature: ingest-v4l2)
//!
//! `none://` names no device at all; opening it fails the same way a missing
//! camera does.
//!
//! Every source produces `Frame`s with RGBA pixels and a `source` attachment.
//! Sources do not retain frames after handing them to the caller.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

pub mod normalize;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use still::StillImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Requested capture quality. Sources that cannot honour a preset fall back
/// to the closest size they support.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPreset {
    #[default]
    High,
    Medium,
    Low,
}

impl SessionPreset {
    /// Requested (width, height) in sensor orientation.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            SessionPreset::High => (1920, 1080),
            SessionPreset::Medium => (1280, 720),
            SessionPreset::Low => (640, 480),
        }
    }
}

/// Where and how to capture.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URI (e.g. "stub://front", "/dev/video0", "file:///tmp/cards").
    pub uri: String,
    /// Target frame rate. The capture worker paces itself to this rate.
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            target_fps: 15,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A device or stream that yields frames.
pub trait FrameSource: Send {
    /// Source identifier, used in logs and the `source` attachment.
    fn name(&self) -> &str;

    /// Acquire the device. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Build the source named by `config.uri`, requesting `preset`. Does not
/// connect it.
///
/// Fails when the URI names no device or a device kind this build cannot
/// open.
pub fn open_source(config: &SourceConfig, preset: SessionPreset) -> Result<Box<dyn FrameSource>> {
    let uri = config.uri.trim();
    if uri.is_empty() || uri.starts_with("none://") {
        return Err(anyhow!("no camera device available"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_uri(uri, preset)?));
    }
    if uri.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(uri, preset, config.target_fps)));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                uri
            ));
        }
    }
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Box::new(StillImageSource::new(path)));
    }
    if uri.contains("://") {
        return Err(anyhow!("unsupported source scheme: {}", uri));
    }
    Ok(Box::new(StillImageSource::new(uri)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> SourceConfig {
        SourceConfig {
            uri: uri.to_string(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn missing_device_uris_fail_to_open() {
        assert!(open_source(&config("none://"), SessionPreset::High).is_err());
        assert!(open_source(&config("   "), SessionPreset::High).is_err());
        assert!(open_source(&config("rtsp://camera-1/stream"), SessionPreset::High).is_err());
    }

    #[test]
    fn stub_and_file_uris_open() -> Result<()> {
        let source = open_source(&config("stub://front?size=64x48"), SessionPreset::High)?;
        assert_eq!(source.name(), "stub://front?size=64x48");

        let source = open_source(&config("file:///tmp/cards"), SessionPreset::Low)?;
        assert_eq!(source.name(), "/tmp/cards");
        Ok(())
    }

    #[test]
    fn presets_request_decreasing_sizes() {
        let (hw, hh) = SessionPreset::High.dimensions();
        let (mw, mh) = SessionPreset::Medium.dimensions();
        let (lw, lh) = SessionPreset::Low.dimensions();
        assert!(hw * hh > mw * mh);
        assert!(mw * mh > lw * lh);
    }
}
