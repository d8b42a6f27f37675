//! Overlay generation, perspective warping and compositing.
//!
//! An overlay is generated at the size of the frame extent, warped so the
//! extent's corners land on a detected rectangle's corners, and composited
//! source-over onto the running output. Pixels outside the warped quad are
//! fully transparent, so only the rectangle is painted.

use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, RectangleFeature};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
/// Quads smaller than a pixel are not drawn.
const MIN_WARP_AREA: f32 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OverlayKind {
    /// Uniform random RGBA per pixel.
    #[default]
    Noise,
    /// Flat colour.
    Solid { rgba: [u8; 4] },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostFilter {
    Sepia,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayOptions {
    pub kind: OverlayKind,
    /// Fixed alpha for every overlay pixel. `None` keeps the generated alpha.
    pub alpha: Option<u8>,
    /// Pixelate the warped overlay with this block size.
    pub pixelate: Option<u32>,
    /// Seed for the noise generator; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Filter applied to the whole composited frame.
    pub post_filter: Option<PostFilter>,
}

pub struct OverlayGenerator {
    options: OverlayOptions,
    rng: StdRng,
}

impl OverlayGenerator {
    pub fn new(options: OverlayOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { options, rng }
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    /// Generate an overlay covering `extent`.
    ///
    /// The generator is unbounded in principle; the result is already
    /// cropped to the extent.
    pub fn generate(&mut self, extent: Rect) -> RgbaImage {
        let w = extent.width.max(0.0).round() as u32;
        let h = extent.height.max(0.0).round() as u32;
        let mut image = match self.options.kind {
            OverlayKind::Noise => {
                let rng = &mut self.rng;
                RgbaImage::from_fn(w, h, |_, _| Rgba(rng.gen::<[u8; 4]>()))
            }
            OverlayKind::Solid { rgba } => RgbaImage::from_pixel(w, h, Rgba(rgba)),
        };
        if let Some(alpha) = self.options.alpha {
            for p in image.pixels_mut() {
                p.0[3] = alpha;
            }
        }
        image
    }

    /// Generate an overlay, warp it onto `feature` and apply pixelation.
    ///
    /// Returns `None` when the feature is degenerate.
    pub fn overlay_for(&mut self, extent: Rect, feature: &RectangleFeature) -> Option<RgbaImage> {
        let overlay = self.generate(extent);
        let mut warped = warp_perspective(&overlay, extent, feature)?;
        if let Some(block) = self.options.pixelate {
            pixelate(&mut warped, block);
        }
        Some(warped)
    }
}

/// Warp `src` (covering `extent`) so its corners map onto `feature`.
///
/// The output has the same size as `src`; everything outside the quad is
/// transparent. Returns `None` for quads with no area or no projective fit.
pub fn warp_perspective(
    src: &RgbaImage,
    extent: Rect,
    feature: &RectangleFeature,
) -> Option<RgbaImage> {
    let area = feature.area();
    if area.is_nan() || area < MIN_WARP_AREA {
        return None;
    }
    let from = extent.corners().map(|p| (p.x - extent.x, p.y - extent.y));
    let to = feature.corners().map(|p| (p.x, p.y));
    let projection = Projection::from_control_points(from, to)?;

    let mut out = RgbaImage::new(src.width(), src.height());
    warp_into(src, &projection, Interpolation::Bilinear, TRANSPARENT, &mut out);
    Some(out)
}

/// Straight-alpha source-over: draw `src` on top of `dst` in place.
///
/// Images must share dimensions; extra pixels of the larger image are ignored.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage) {
    let w = dst.width().min(src.width());
    let h = dst.height().min(src.height());
    for y in 0..h {
        for x in 0..w {
            let s = src.get_pixel(x, y).0;
            match s[3] {
                0 => continue,
                255 => dst.put_pixel(x, y, Rgba(s)),
                _ => {
                    let d = dst.get_pixel(x, y).0;
                    dst.put_pixel(x, y, Rgba(blend(s, d)));
                }
            }
        }
    }
}

fn blend(s: [u8; 4], d: [u8; 4]) -> [u8; 4] {
    let sa = s[3] as f32 / 255.0;
    let da = d[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (s[c] as f32 * sa + d[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    out
}

/// Replace each `block` x `block` tile with its alpha-weighted mean colour.
pub fn pixelate(image: &mut RgbaImage, block: u32) {
    if block < 2 {
        return;
    }
    let (w, h) = image.dimensions();
    for by in (0..h).step_by(block as usize) {
        for bx in (0..w).step_by(block as usize) {
            let bw = block.min(w - bx);
            let bh = block.min(h - by);
            // Colour is weighted by alpha so transparent pixels do not darken the tile.
            let mut rgb = [0u64; 3];
            let mut alpha = 0u64;
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let p = image.get_pixel(x, y).0;
                    let a = p[3] as u64;
                    for c in 0..3 {
                        rgb[c] += p[c] as u64 * a;
                    }
                    alpha += a;
                }
            }
            if alpha == 0 {
                continue;
            }
            let n = (bw * bh) as u64;
            let mean = Rgba([
                (rgb[0] / alpha) as u8,
                (rgb[1] / alpha) as u8,
                (rgb[2] / alpha) as u8,
                (alpha / n) as u8,
            ]);
            for y in by..by + bh {
                for x in bx..bx + bw {
                    image.put_pixel(x, y, mean);
                }
            }
        }
    }
}

/// Classic sepia tone matrix.
pub fn sepia(image: &mut RgbaImage) {
    for p in image.pixels_mut() {
        let [r, g, b, a] = p.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).round().min(255.0) as u8;
        p.0 = [
            tone(0.393, 0.769, 0.189),
            tone(0.349, 0.686, 0.168),
            tone(0.272, 0.534, 0.131),
            a,
        ];
    }
}
