//! Pixel-space geometry shared by detection, warping and rendering.
//!
//! All coordinates are in pixels with the origin at the top-left corner of
//! the image and y growing downwards.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a `width` x `height` image.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn mid_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Width over height. Zero for degenerate rectangles.
    pub fn aspect(&self) -> f32 {
        if self.height <= 0.0 {
            return 0.0;
        }
        self.width / self.height
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.max_x() && p.y < self.max_y()
    }

    /// Corners in top-left, top-right, bottom-left, bottom-right order.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.max_x(), self.y),
            Point::new(self.x, self.max_y()),
            Point::new(self.max_x(), self.max_y()),
        ]
    }
}

/// A detected quadrilateral within a frame's extent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectangleFeature {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl RectangleFeature {
    pub fn new(top_left: Point, top_right: Point, bottom_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }

    /// Build a feature from the four corners of a convex quad, in any order.
    ///
    /// Corners are walked clockwise (on screen, y down) around their
    /// centroid, starting from the one with the smallest `x + y`. Each input
    /// point receives exactly one label, whatever the rotation.
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
        let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;
        let mut ring = points;
        ring.sort_by(|a, b| {
            let ta = (a.y - cy).atan2(a.x - cx);
            let tb = (b.y - cy).atan2(b.x - cx);
            ta.total_cmp(&tb)
        });
        let start = (0..4)
            .min_by(|&i, &j| (ring[i].x + ring[i].y).total_cmp(&(ring[j].x + ring[j].y)))
            .unwrap_or(0);
        ring.rotate_left(start);
        let [top_left, top_right, bottom_right, bottom_left] = ring;
        Self::new(top_left, top_right, bottom_left, bottom_right)
    }

    /// Corners in top-left, top-right, bottom-left, bottom-right order.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }

    pub fn scaled(&self, factor: f32) -> Self {
        let s = |p: Point| Point::new(p.x * factor, p.y * factor);
        Self::new(
            s(self.top_left),
            s(self.top_right),
            s(self.bottom_left),
            s(self.bottom_right),
        )
    }

    /// Mean of opposite side lengths, long side over short side.
    pub fn aspect_ratio(&self) -> f32 {
        let top = self.top_left.distance(self.top_right);
        let bottom = self.bottom_left.distance(self.bottom_right);
        let left = self.top_left.distance(self.bottom_left);
        let right = self.top_right.distance(self.bottom_right);
        let horizontal = (top + bottom) / 2.0;
        let vertical = (left + right) / 2.0;
        let (long, short) = if horizontal >= vertical {
            (horizontal, vertical)
        } else {
            (vertical, horizontal)
        };
        if short <= f32::EPSILON {
            return f32::INFINITY;
        }
        long / short
    }

    /// Shoelace area of the quadrilateral.
    pub fn area(&self) -> f32 {
        polygon_area(&[
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ])
    }
}

/// Absolute area of a simple polygon given in boundary order.
pub fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        acc += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    (acc.abs() / 2.0) as f32
}

/// Source and destination rectangles for drawing a frame onto a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderGeometry {
    /// Region of the frame extent to sample.
    pub source: Rect,
    /// Region of the surface backing store (in pixels) to fill.
    pub destination: Rect,
}

impl RenderGeometry {
    /// Fit an image extent to a display surface.
    ///
    /// The destination is the surface bounds scaled to backing-store pixels.
    /// The source keeps the full extent height and takes a horizontally
    /// centered slice whose aspect matches the surface, so the picture is
    /// never stretched. When the frame is narrower than the surface the
    /// slice extends past the extent on both sides.
    pub fn fit(extent: Rect, bounds: Rect, scale: f32) -> Self {
        let destination = bounds.scaled(scale);
        let fit_width = if bounds.width > 0.0 {
            extent.height / (bounds.height / bounds.width)
        } else {
            0.0
        };
        let source = Rect::new(
            extent.x + (extent.width - fit_width) / 2.0,
            extent.y,
            fit_width,
            extent.height,
        );
        Self {
            source,
            destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_corners_are_labelled() {
        let feature = RectangleFeature::from_unordered([
            Point::new(90.0, 170.0),
            Point::new(240.0, 190.0),
            Point::new(100.0, 50.0),
            Point::new(220.0, 60.0),
        ]);
        assert_eq!(feature.top_left, Point::new(100.0, 50.0));
        assert_eq!(feature.top_right, Point::new(220.0, 60.0));
        assert_eq!(feature.bottom_left, Point::new(90.0, 170.0));
        assert_eq!(feature.bottom_right, Point::new(240.0, 190.0));
    }

    #[test]
    fn diamond_corners_get_distinct_labels() {
        let feature = RectangleFeature::from_unordered([
            Point::new(100.0, 20.0),
            Point::new(170.0, 100.0),
            Point::new(110.0, 170.0),
            Point::new(40.0, 90.0),
        ]);
        assert_eq!(feature.top_left, Point::new(100.0, 20.0));
        assert_eq!(feature.top_right, Point::new(170.0, 100.0));
        assert_eq!(feature.bottom_right, Point::new(110.0, 170.0));
        assert_eq!(feature.bottom_left, Point::new(40.0, 90.0));
        assert!(feature.area() > 9_000.0);
    }

    #[test]
    fn card_aspect_ratio_and_area() {
        let r = Rect::new(10.0, 10.0, 150.0, 100.0);
        let [tl, tr, bl, br] = r.corners();
        let feature = RectangleFeature::new(tl, tr, bl, br);
        assert!((feature.aspect_ratio() - 1.5).abs() < 1e-4);
        assert!((feature.area() - 15_000.0).abs() < 1e-2);
    }

    #[test]
    fn fit_preserves_surface_aspect_and_centers() {
        let bounds = Rect::new(0.0, 0.0, 375.0, 667.0);
        for (w, h) in [(1080u32, 1920u32), (480, 640), (1920, 1080), (100, 1000)] {
            let extent = Rect::from_size(w, h);
            let geometry = RenderGeometry::fit(extent, bounds, 2.0);
            assert!((geometry.source.aspect() - bounds.aspect()).abs() < 1e-4);
            assert!((geometry.source.mid_x() - extent.mid_x()).abs() < 1e-3);
            assert_eq!(geometry.source.height, extent.height);
            assert_eq!(geometry.destination, Rect::new(0.0, 0.0, 750.0, 1334.0));
        }
    }
}
