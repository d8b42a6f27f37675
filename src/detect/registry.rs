use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::RectangleDetector;

/// A detector shared between the registry and the frame processor.
pub type SharedDetector = Arc<Mutex<dyn RectangleDetector>>;

/// Named rectangle detectors, one of which is selected for the pipeline.
///
/// The first detector registered is selected until `set_default` picks another.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: BTreeMap<&'static str, SharedDetector>,
    selected: Option<&'static str>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D: RectangleDetector + 'static>(&mut self, detector: D) {
        let name = detector.name();
        self.selected.get_or_insert(name);
        self.detectors.insert(name, Arc::new(Mutex::new(detector)));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        let (&key, _) = self.detectors.get_key_value(name).ok_or_else(|| {
            anyhow!(
                "detector '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        self.selected = Some(key);
        Ok(())
    }

    pub fn default_detector(&self) -> Option<SharedDetector> {
        self.selected
            .and_then(|name| self.detectors.get(name))
            .map(Arc::clone)
    }

    /// Registered detector names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.detectors.keys().map(|name| name.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ContourDetector, DetectorOptions, ScriptedDetector};
    use crate::frame::Frame;
    use crate::geometry::{Rect, RectangleFeature};
    use image::RgbaImage;

    fn detect_with_default(registry: &DetectorRegistry, frame: &Frame) -> Result<usize> {
        let detector = registry
            .default_detector()
            .ok_or_else(|| anyhow!("no detector"))?;
        let mut guard = detector.lock().map_err(|_| anyhow!("poisoned"))?;
        Ok(guard.detect(frame)?.len())
    }

    #[test]
    fn first_registered_is_default_until_changed() -> Result<()> {
        let mut registry = DetectorRegistry::new();
        assert!(registry.default_detector().is_none());

        registry.register(ContourDetector::new(DetectorOptions::default()));
        let [tl, tr, bl, br] = Rect::new(1.0, 1.0, 3.0, 2.0).corners();
        registry.register(ScriptedDetector::new(vec![RectangleFeature::new(tl, tr, bl, br)]));
        assert_eq!(registry.list(), vec!["contour", "scripted"]);

        let frame = Frame::new(RgbaImage::new(8, 8), 1);
        assert_eq!(detect_with_default(&registry, &frame)?, 0);

        registry.set_default("scripted")?;
        assert_eq!(detect_with_default(&registry, &frame)?, 1);

        let err = registry.set_default("missing").unwrap_err();
        assert!(err.to_string().contains("contour, scripted"));
        Ok(())
    }
}
