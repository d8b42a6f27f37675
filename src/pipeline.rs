//! Per-frame rectangle search and compositing.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::sync::{Arc, Mutex};

use crate::detect::{RectangleDetector, SharedDetector};
use crate::frame::{ComposedFrame, Frame};
use crate::geometry::{Rect, RectangleFeature};
use crate::overlay::{composite_over, sepia, OverlayGenerator, OverlayOptions, PostFilter};

/// Runs detection and compositing for one frame at a time.
pub struct FrameProcessor {
    detector: SharedDetector,
    overlay: OverlayGenerator,
}

impl FrameProcessor {
    pub fn new(detector: SharedDetector, overlay: OverlayOptions) -> Self {
        Self {
            detector,
            overlay: OverlayGenerator::new(overlay),
        }
    }

    /// Convenience constructor for an unshared detector.
    pub fn with_detector<D: RectangleDetector + 'static>(detector: D, overlay: OverlayOptions) -> Self {
        let shared: SharedDetector = Arc::new(Mutex::new(detector));
        Self::new(shared, overlay)
    }

    /// Detect rectangles in `frame`.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<RectangleFeature>> {
        let mut guard = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        guard.detect(frame)
    }

    /// Composite one overlay per feature, in order, over a copy of `base`.
    ///
    /// Later features draw on top of earlier ones. With no features the
    /// result is `base` unchanged. Degenerate features are skipped.
    pub fn composite(&mut self, base: RgbaImage, features: &[RectangleFeature]) -> (RgbaImage, usize) {
        let extent = Rect::from_size(base.width(), base.height());
        let mut output = base;
        let mut drawn = 0;
        for feature in features {
            match self.overlay.overlay_for(extent, feature) {
                Some(overlay) => {
                    composite_over(&mut output, &overlay);
                    drawn += 1;
                }
                None => log::debug!("skipping degenerate rectangle {:?}", feature),
            }
        }
        if let Some(PostFilter::Sepia) = self.overlay.options().post_filter {
            sepia(&mut output);
        }
        (output, drawn)
    }

    /// Full per-frame step: detect, then composite.
    ///
    /// A detector failure is logged and the frame passes through unmodified.
    pub fn on_frame(&mut self, frame: Frame) -> ComposedFrame {
        let features = match self.detect(&frame) {
            Ok(features) => features,
            Err(e) => {
                log::warn!("rectangle detection failed on frame {}: {}", frame.sequence(), e);
                Vec::new()
            }
        };
        let extent = frame.extent();
        let sequence = frame.sequence();
        let waited = frame.age();
        let (image, rectangles) = self.composite(frame.into_pixels(), &features);
        log::debug!(
            "frame {}: {} rectangles composited ({:?} after capture)",
            sequence,
            rectangles,
            waited
        );
        ComposedFrame {
            image,
            extent,
            sequence,
            rectangles,
        }
    }
}
