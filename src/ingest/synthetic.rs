//! Synthetic camera (`stub://`).
//!
//! Renders a dark, slightly graded background with bright card-shaped
//! quadrilaterals (long side 1.5x the short side) that drift and tilt a
//! little from frame to frame. Useful for demos and for exercising the
//! detector without hardware.
//!
//! Query parameters:
//! - `size=WxH`: frame size (defaults to the preset's dimensions)
//! - `cards=N`: number of cards, 0..=4 (default 1)
//! - `frames=N`: end the stream with an error after N frames (default: endless)

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};

use super::{FrameSource, SessionPreset, SourceStats};
use crate::frame::{Frame, ATTACHMENT_SOURCE};
use crate::geometry::Point;

const MAX_CARDS: usize = 4;
const BACKGROUND: u8 = 28;
const CARD_VALUE: u8 = 230;

pub struct SyntheticSource {
    uri: String,
    width: u32,
    height: u32,
    cards: usize,
    connected: bool,
    frame_count: u64,
    frame_limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(uri: &str, width: u32, height: u32, cards: usize) -> Self {
        Self {
            uri: uri.to_string(),
            width,
            height,
            cards: cards.min(MAX_CARDS),
            connected: false,
            frame_count: 0,
            frame_limit: None,
        }
    }

    /// Parse `stub://name?size=WxH&cards=N`.
    pub fn from_uri(uri: &str, preset: SessionPreset) -> Result<Self> {
        let (mut width, mut height) = preset.dimensions();
        let mut cards = 1usize;
        let mut frame_limit = None;

        if let Some((_, query)) = uri.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("malformed stub parameter: {}", pair))?;
                match key {
                    "size" => {
                        let (w, h) = value
                            .split_once('x')
                            .ok_or_else(|| anyhow!("stub size must be WxH, got {}", value))?;
                        width = w.parse().context("stub size width")?;
                        height = h.parse().context("stub size height")?;
                    }
                    "cards" => {
                        cards = value.parse().context("stub card count")?;
                    }
                    "frames" => {
                        frame_limit = Some(value.parse().context("stub frame limit")?);
                    }
                    other => return Err(anyhow!("unknown stub parameter: {}", other)),
                }
            }
        }
        if width < 16 || height < 16 {
            return Err(anyhow!("stub frame size too small: {}x{}", width, height));
        }
        Ok(Self {
            frame_limit,
            ..Self::new(uri, width, height, cards)
        })
    }

    /// Corners of card `index` at `frame`, in top-left, top-right,
    /// bottom-right, bottom-left order.
    pub fn card_corners(&self, index: usize, frame: u64) -> [Point; 4] {
        let w = self.width as f32;
        let h = self.height as f32;
        let columns = self.cards.clamp(1, 2) as f32;
        let rows = if self.cards > 2 { 2.0 } else { 1.0 };
        let cell_w = w / columns;
        let cell_h = h / rows;
        let col = (index % 2) as f32;
        let row = (index / 2) as f32;

        let short = (cell_w / 1.5).min(cell_h) * 0.5;
        let long = short * 1.5;

        let phase = frame as f32 / 24.0 + index as f32;
        let cx = cell_w * (col + 0.5) + phase.sin() * cell_w * 0.05;
        let cy = cell_h * (row + 0.5) + phase.cos() * cell_h * 0.05;
        let angle = (phase * 0.7).sin() * 0.12;
        let (sin, cos) = angle.sin_cos();

        let corner = |dx: f32, dy: f32| {
            Point::new(cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
        };
        [
            corner(-long / 2.0, -short / 2.0),
            corner(long / 2.0, -short / 2.0),
            corner(long / 2.0, short / 2.0),
            corner(-long / 2.0, short / 2.0),
        ]
    }

    fn render(&self) -> RgbaImage {
        let quads: Vec<[Point; 4]> = (0..self.cards)
            .map(|i| self.card_corners(i, self.frame_count))
            .collect();
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            if quads.iter().any(|q| inside_convex(q, p)) {
                Rgba([CARD_VALUE, CARD_VALUE, CARD_VALUE - 10, 255])
            } else {
                let shade = BACKGROUND + ((x + y) % 8) as u8;
                Rgba([shade, shade, shade + 4, 255])
            }
        })
    }
}

fn inside_convex(quad: &[Point; 4], p: Point) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
    }
    true
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.uri
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{}, {} cards)",
            self.uri,
            self.width,
            self.height,
            self.cards
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.uri));
        }
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Err(anyhow!(
                "synthetic source {} ended after {} frames",
                self.uri,
                self.frame_count
            ));
        }
        self.frame_count += 1;
        let image = self.render();
        Ok(Frame::new(image, self.frame_count).with_attachment(ATTACHMENT_SOURCE, &self.uri))
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.frame_limit.map_or(true, |limit| self.frame_count < limit)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.uri.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::from_uri("stub://test?size=64x48", SessionPreset::High)?;
        assert!(source.next_frame().is_err());
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.attachment(ATTACHMENT_SOURCE), Some("stub://test?size=64x48"));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn finite_stream_ends_with_an_error() -> Result<()> {
        let mut source = SyntheticSource::from_uri("stub://clip?size=32x32&frames=2", SessionPreset::Low)?;
        source.connect()?;
        source.next_frame()?;
        assert!(source.is_healthy());
        source.next_frame()?;
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn preset_sets_default_size() -> Result<()> {
        let source = SyntheticSource::from_uri("stub://cam", SessionPreset::Low)?;
        assert_eq!((source.width, source.height), (640, 480));
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SyntheticSource::from_uri("stub://x?size=64", SessionPreset::Low).is_err());
        assert!(SyntheticSource::from_uri("stub://x?fps=3", SessionPreset::Low).is_err());
        assert!(SyntheticSource::from_uri("stub://x?size=8x8", SessionPreset::Low).is_err());
    }

    #[test]
    fn cards_are_drawn_bright_on_dark() -> Result<()> {
        let mut source = SyntheticSource::from_uri("stub://x?size=120x80&cards=1", SessionPreset::Low)?;
        source.connect()?;
        let frame = source.next_frame()?;
        let center = frame.pixels().get_pixel(60, 40);
        let corner = frame.pixels().get_pixel(1, 1);
        assert!(center.0[0] > 200);
        assert!(corner.0[0] < 50);
        Ok(())
    }
}
