//! Display surfaces and the render stage.
//!
//! A `DisplaySurface` owns a backing store sized to its bounds times its
//! scale factor. The `Renderer` draws each composited frame into the
//! backing store, presents it and asks the surface to refresh.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{ComposedFrame, LatestSlot};
use crate::geometry::{Rect, RenderGeometry};

/// A drawable surface bound to a backing store.
pub trait DisplaySurface {
    /// Bounds in logical points.
    fn bounds(&self) -> Rect;

    /// Backing-store pixels per logical point.
    fn scale(&self) -> f32;

    /// Draw the `source` region of `image` into the `destination` region of
    /// the backing store, resampling as needed.
    fn draw(&mut self, image: &RgbaImage, destination: Rect, source: Rect) -> Result<()>;

    /// Publish the backing store.
    fn present(&mut self) -> Result<()>;

    /// Request a redisplay of the presented contents.
    fn refresh(&mut self) -> Result<()>;
}

/// Nearest-neighbour blit. Source samples outside `image` are black; the
/// drawn pixels are flattened onto black and made opaque.
fn blit(backing: &mut RgbaImage, image: &RgbaImage, destination: Rect, source: Rect) {
    if destination.width <= 0.0 || destination.height <= 0.0 {
        return;
    }
    let (bw, bh) = backing.dimensions();
    let x0 = destination.x.max(0.0).floor() as u32;
    let y0 = destination.y.max(0.0).floor() as u32;
    let x1 = (destination.max_x().ceil().max(0.0) as u32).min(bw);
    let y1 = (destination.max_y().ceil().max(0.0) as u32).min(bh);
    let sx = source.width / destination.width;
    let sy = source.height / destination.height;

    for y in y0..y1 {
        let src_y = source.y + (y as f32 + 0.5 - destination.y) * sy;
        for x in x0..x1 {
            let src_x = source.x + (x as f32 + 0.5 - destination.x) * sx;
            let pixel = if src_x >= 0.0
                && src_y >= 0.0
                && (src_x as u32) < image.width()
                && (src_y as u32) < image.height()
            {
                let [r, g, b, a] = image.get_pixel(src_x as u32, src_y as u32).0;
                let over_black = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
                Rgba([over_black(r), over_black(g), over_black(b), 255])
            } else {
                Rgba([0, 0, 0, 255])
            };
            backing.put_pixel(x, y, pixel);
        }
    }
}

// ----------------------------------------------------------------------------
// MemorySurface
// ----------------------------------------------------------------------------

/// Surface whose backing store and presented buffer live in memory.
pub struct MemorySurface {
    bounds: Rect,
    scale: f32,
    backing: RgbaImage,
    presented: Option<RgbaImage>,
    presents: u64,
    refreshes: u64,
}

impl MemorySurface {
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        let bounds = Rect::new(0.0, 0.0, width, height);
        let px = bounds.scaled(scale);
        Self {
            bounds,
            scale,
            backing: RgbaImage::new(px.width.round() as u32, px.height.round() as u32),
            presented: None,
            presents: 0,
            refreshes: 0,
        }
    }

    pub fn backing_store(&self) -> &RgbaImage {
        &self.backing
    }

    /// Contents as of the last `present`.
    pub fn presented(&self) -> Option<&RgbaImage> {
        self.presented.as_ref()
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }
}

impl DisplaySurface for MemorySurface {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn scale(&self) -> f32 {
        self.scale
    }

    fn draw(&mut self, image: &RgbaImage, destination: Rect, source: Rect) -> Result<()> {
        blit(&mut self.backing, image, destination, source);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented = Some(self.backing.clone());
        self.presents += 1;
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// PngSurface
// ----------------------------------------------------------------------------

/// Memory surface that also writes every `every_nth` presented frame to
/// `<dir>/frame-NNNNNN.png`.
pub struct PngSurface {
    inner: MemorySurface,
    dir: PathBuf,
    every_nth: u64,
    written: u64,
}

impl PngSurface {
    pub fn new(inner: MemorySurface, dir: &Path, every_nth: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir {}", dir.display()))?;
        Ok(Self {
            inner,
            dir: dir.to_path_buf(),
            every_nth: every_nth.max(1),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DisplaySurface for PngSurface {
    fn bounds(&self) -> Rect {
        self.inner.bounds()
    }

    fn scale(&self) -> f32 {
        self.inner.scale()
    }

    fn draw(&mut self, image: &RgbaImage, destination: Rect, source: Rect) -> Result<()> {
        self.inner.draw(image, destination, source)
    }

    fn present(&mut self) -> Result<()> {
        self.inner.present()?;
        let index = self.inner.presents();
        if (index - 1) % self.every_nth == 0 {
            let path = self.dir.join(format!("frame-{:06}.png", index));
            self.inner
                .backing_store()
                .save(&path)
                .with_context(|| format!("write {}", path.display()))?;
            self.written += 1;
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.inner.refresh()
    }
}

// ----------------------------------------------------------------------------
// Renderer
// ----------------------------------------------------------------------------

/// The render stage. Lives on the thread that owns the surface.
pub struct Renderer<S: DisplaySurface> {
    surface: S,
    rendered: u64,
    last_sequence: Option<u64>,
}

impl<S: DisplaySurface> Renderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            rendered: 0,
            last_sequence: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Draw, present and refresh one composited frame.
    pub fn render(&mut self, frame: &ComposedFrame) -> Result<RenderGeometry> {
        let geometry = RenderGeometry::fit(frame.extent, self.surface.bounds(), self.surface.scale());
        self.surface
            .draw(&frame.image, geometry.destination, geometry.source)?;
        self.surface.present()?;
        self.surface.refresh()?;
        self.rendered += 1;
        self.last_sequence = Some(frame.sequence);
        Ok(geometry)
    }

    /// Wait up to `timeout` for the newest frame in `slot` and render it.
    ///
    /// Returns the rendered sequence number, or `None` if nothing arrived.
    pub fn render_next(
        &mut self,
        slot: &LatestSlot<ComposedFrame>,
        timeout: Duration,
    ) -> Result<Option<u64>> {
        match slot.recv_timeout(timeout) {
            Some(frame) => {
                self.render(&frame)?;
                Ok(Some(frame.sequence))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(w: u32, h: u32, color: [u8; 4], sequence: u64) -> ComposedFrame {
        ComposedFrame {
            image: RgbaImage::from_pixel(w, h, Rgba(color)),
            extent: Rect::from_size(w, h),
            sequence,
            rectangles: 0,
        }
    }

    #[test]
    fn renderer_draws_presents_and_refreshes() -> Result<()> {
        let mut renderer = Renderer::new(MemorySurface::new(30.0, 40.0, 2.0));
        let geometry = renderer.render(&composed(60, 80, [9, 99, 199, 255], 4))?;

        assert_eq!(geometry.destination, Rect::new(0.0, 0.0, 60.0, 80.0));
        let surface = renderer.surface();
        assert_eq!(surface.backing_store().dimensions(), (60, 80));
        assert_eq!(surface.presents(), 1);
        assert_eq!(surface.refreshes(), 1);
        let presented = surface.presented().expect("presented");
        assert_eq!(presented.get_pixel(30, 40).0, [9, 99, 199, 255]);
        assert_eq!(renderer.last_sequence(), Some(4));
        Ok(())
    }

    #[test]
    fn narrow_frames_are_padded_with_black() -> Result<()> {
        // Surface is square, frame is tall: the centered source slice is
        // wider than the frame, so the sides come out black.
        let mut renderer = Renderer::new(MemorySurface::new(40.0, 40.0, 1.0));
        renderer.render(&composed(10, 40, [255, 255, 255, 255], 1))?;
        let store = renderer.surface().backing_store();
        assert_eq!(store.get_pixel(0, 20).0, [0, 0, 0, 255]);
        assert_eq!(store.get_pixel(20, 20).0, [255, 255, 255, 255]);
        assert_eq!(store.get_pixel(39, 20).0, [0, 0, 0, 255]);
        Ok(())
    }

    #[test]
    fn render_next_takes_latest_from_slot() -> Result<()> {
        let slot = LatestSlot::new();
        slot.send(composed(4, 4, [1, 1, 1, 255], 1));
        slot.send(composed(4, 4, [2, 2, 2, 255], 2));

        let mut renderer = Renderer::new(MemorySurface::new(4.0, 4.0, 1.0));
        assert_eq!(renderer.render_next(&slot, Duration::from_millis(10))?, Some(2));
        assert_eq!(renderer.render_next(&slot, Duration::from_millis(10))?, None);
        assert_eq!(renderer.rendered(), 1);
        assert_eq!(slot.dropped(), 1);
        Ok(())
    }

    #[test]
    fn png_surface_writes_every_nth_present() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let surface = PngSurface::new(MemorySurface::new(8.0, 8.0, 1.0), dir.path(), 2)?;
        let mut renderer = Renderer::new(surface);
        for seq in 1..=5 {
            renderer.render(&composed(8, 8, [50, 60, 70, 255], seq))?;
        }
        assert_eq!(renderer.surface().written(), 3);
        assert!(dir.path().join("frame-000001.png").exists());
        assert!(dir.path().join("frame-000003.png").exists());
        assert!(!dir.path().join("frame-000002.png").exists());
        Ok(())
    }
}
