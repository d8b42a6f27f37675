//! Still image source.
//!
//! Replays a single image, or every PNG/JPEG in a directory in sorted order,
//! looping forever. Images are decoded once at connect time.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, ATTACHMENT_SOURCE};

pub struct StillImageSource {
    path: String,
    images: Vec<RgbaImage>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            images: Vec::new(),
            frame_count: 0,
        }
    }
}

fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("png" | "jpg" | "jpeg")
    )
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl FrameSource for StillImageSource {
    fn name(&self) -> &str {
        &self.path
    }

    fn connect(&mut self) -> Result<()> {
        let root = Path::new(&self.path);
        let paths = if root.is_dir() {
            list_images(root)?
        } else {
            vec![root.to_path_buf()]
        };

        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            let image = image::open(path)
                .with_context(|| format!("decode image {}", path.display()))?
                .to_rgba8();
            images.push(image);
        }
        if images.is_empty() {
            return Err(anyhow!("no images found under {}", self.path));
        }

        log::info!(
            "StillImageSource: connected to {} ({} images)",
            self.path,
            images.len()
        );
        self.images = images;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.images.is_empty() {
            return Err(anyhow!("still image source {} not connected", self.path));
        }
        let index = (self.frame_count % self.images.len() as u64) as usize;
        self.frame_count += 1;
        Ok(Frame::new(self.images[index].clone(), self.frame_count)
            .with_attachment(ATTACHMENT_SOURCE, &self.path))
    }

    fn is_healthy(&self) -> bool {
        !self.images.is_empty()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn replays_directory_in_sorted_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])).save(dir.path().join("b.png"))?;
        RgbaImage::from_pixel(4, 4, Rgba([0, 200, 0, 255])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = StillImageSource::new(dir.path().to_str().unwrap());
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        let third = source.next_frame()?;
        assert_eq!(first.pixels().get_pixel(0, 0).0, [0, 200, 0, 255]);
        assert_eq!(second.pixels().get_pixel(0, 0).0, [200, 0, 0, 255]);
        assert_eq!(third.pixels().get_pixel(0, 0).0, [0, 200, 0, 255]);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn missing_file_fails_connect() {
        let mut source = StillImageSource::new("/nonexistent/overlay-camera/card.png");
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
    }
}
