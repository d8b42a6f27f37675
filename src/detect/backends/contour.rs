//! CPU rectangle detector.
//!
//! Pipeline: luma, global Otsu threshold, 4-connected components of both
//! polarities (bright-on-dark and dark-on-bright), convex hull of each
//! component's boundary, Douglas-Peucker reduction of the hull, then shape
//! checks (four vertices, minimum area, fill ratio, aspect ratio).
//!
//! Components touching the frame border are ignored; a partially visible
//! card cannot be measured. Detection order is the raster order of each
//! component's first pixel.

use anyhow::Result;
use image::{GrayImage, Luma};

use crate::detect::backend::{Accuracy, DetectorOptions, RectangleDetector};
use crate::frame::Frame;
use crate::geometry::{polygon_area, Point, RectangleFeature};

/// Frames whose luma range is below this carry no usable edges.
const MIN_CONTRAST: u8 = 24;
/// Douglas-Peucker tolerance as a fraction of the hull perimeter.
const APPROX_EPSILON_FRACTION: f32 = 0.02;

pub struct ContourDetector {
    options: DetectorOptions,
}

impl ContourDetector {
    pub fn new(options: DetectorOptions) -> Self {
        Self { options }
    }

    fn min_fill_ratio(&self) -> f32 {
        match self.options.accuracy {
            Accuracy::High => 0.85,
            Accuracy::Low => 0.75,
        }
    }
}

impl RectangleDetector for ContourDetector {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RectangleFeature>> {
        let factor = match self.options.accuracy {
            Accuracy::High => 1,
            Accuracy::Low => 2,
        };
        let gray = luma(frame, factor);
        let (w, h) = gray.dimensions();
        if w < 3 || h < 3 {
            return Ok(Vec::new());
        }

        let (lo, hi) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        if hi.saturating_sub(lo) < MIN_CONTRAST {
            return Ok(Vec::new());
        }
        let threshold = otsu_threshold(&gray);

        let frame_area = (w * h) as f32;
        let min_pixels = ((self.options.min_area_fraction * frame_area) as usize).max(16);

        let mut candidates: Vec<(usize, RectangleFeature)> = Vec::new();
        for bright in [true, false] {
            let mask: Vec<bool> = gray
                .pixels()
                .map(|p| (p.0[0] > threshold) == bright)
                .collect();
            for component in components(&mask, w as usize, h as usize) {
                if component.touches_border || component.pixels < min_pixels {
                    continue;
                }
                if let Some(feature) = self.fit_quad(&component, frame_area) {
                    candidates.push((component.first_index, feature));
                }
            }
        }

        candidates.sort_by_key(|(first, _)| *first);
        let scale = factor as f32;
        let features: Vec<RectangleFeature> = candidates
            .into_iter()
            .take(self.options.max_features)
            .map(|(_, f)| if factor == 1 { f } else { f.scaled(scale) })
            .collect();

        log::trace!(
            "contour detector: frame {} threshold={} features={}",
            frame.sequence(),
            threshold,
            features.len()
        );
        Ok(features)
    }
}

impl ContourDetector {
    fn fit_quad(&self, component: &Component, frame_area: f32) -> Option<RectangleFeature> {
        let hull = convex_hull(component.boundary.clone());
        if hull.len() < 4 {
            return None;
        }
        let perimeter: f32 = (0..hull.len())
            .map(|i| hull[i].distance(hull[(i + 1) % hull.len()]))
            .sum();
        let quad = approx_closed_polygon(&hull, perimeter * APPROX_EPSILON_FRACTION);
        if quad.len() != 4 {
            return None;
        }

        let area = polygon_area(&quad);
        if area < self.options.min_area_fraction * frame_area || area <= 0.0 {
            return None;
        }
        if (component.pixels as f32 / area) < self.min_fill_ratio() {
            return None;
        }

        let feature = RectangleFeature::from_unordered([quad[0], quad[1], quad[2], quad[3]]);
        if !self.options.accepts_aspect(feature.aspect_ratio()) {
            return None;
        }
        Some(feature)
    }
}

/// Luma plane, box-downsampled by `factor`.
fn luma(frame: &Frame, factor: u32) -> GrayImage {
    let src = frame.pixels();
    let w = (src.width() / factor).max(1);
    let h = (src.height() / factor).max(1);
    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = 0u32;
        let mut n = 0u32;
        for dy in 0..factor {
            for dx in 0..factor {
                let sx = x * factor + dx;
                let sy = y * factor + dy;
                if sx < src.width() && sy < src.height() {
                    let p = src.get_pixel(sx, sy).0;
                    acc += (299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32) / 1000;
                    n += 1;
                }
            }
        }
        Luma([(acc / n.max(1)) as u8])
    })
}

/// Otsu's method: the threshold maximising between-class variance.
pub(crate) fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut best = 0u8;
    let mut best_var = -1.0f64;
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let var = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if var > best_var {
            best_var = var;
            best = t as u8;
        }
    }
    best
}

struct Component {
    /// Raster index of the first pixel found; defines detection order.
    first_index: usize,
    pixels: usize,
    touches_border: bool,
    /// Outer corners of boundary pixels.
    boundary: Vec<Point>,
}

/// 4-connected components of `mask`, in raster discovery order.
fn components(mask: &[bool], w: usize, h: usize) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut out = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut component = Component {
            first_index: start,
            pixels: 0,
            touches_border: false,
            boundary: Vec::new(),
        };

        while let Some(idx) = stack.pop() {
            component.pixels += 1;
            let x = idx % w;
            let y = idx / w;
            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                component.touches_border = true;
            }

            let mut on_boundary = false;
            let neighbors = [
                (x > 0).then(|| idx - 1),
                (x + 1 < w).then(|| idx + 1),
                (y > 0).then(|| idx - w),
                (y + 1 < h).then(|| idx + w),
            ];
            for neighbor in neighbors {
                match neighbor {
                    Some(n) if mask[n] => {
                        if !visited[n] {
                            visited[n] = true;
                            stack.push(n);
                        }
                    }
                    _ => on_boundary = true,
                }
            }

            if on_boundary {
                let (fx, fy) = (x as f32, y as f32);
                component.boundary.extend_from_slice(&[
                    Point::new(fx, fy),
                    Point::new(fx + 1.0, fy),
                    Point::new(fx, fy + 1.0),
                    Point::new(fx + 1.0, fy + 1.0),
                ]);
            }
        }
        out.push(component);
    }
    out
}

fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Andrew's monotone chain. Returns the hull in boundary order without
/// collinear points.
pub(crate) fn convex_hull(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<Point> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let len = a.distance(b);
    if len <= f32::EPSILON {
        return p.distance(a);
    }
    cross(a, b, p).abs() / len
}

/// Douglas-Peucker simplification of a closed polygon.
///
/// Seeds the recursion with the two vertices farthest apart, which for a
/// quadrilateral are opposite corners.
pub(crate) fn approx_closed_polygon(points: &[Point], epsilon: f32) -> Vec<Point> {
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }

    let (mut a, mut b, mut far) = (0, 0, -1.0f32);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i].distance(points[j]);
            if d > far {
                far = d;
                a = i;
                b = j;
            }
        }
    }

    let mut keep = vec![false; n];
    keep[a] = true;
    keep[b] = true;
    // Spans are (start, end) with end > start, indices taken modulo n.
    let mut stack = vec![(a, b), (b, a + n)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let pa = points[start % n];
        let pb = points[end % n];
        let (mut split, mut max_dist) = (start, 0.0f32);
        for i in (start + 1)..end {
            let d = segment_distance(points[i % n], pa, pb);
            if d > max_dist {
                max_dist = d;
                split = i;
            }
        }
        if max_dist > epsilon {
            keep[split % n] = true;
            stack.push((start, split));
            stack.push((split, end));
        }
    }

    (0..n).filter(|&i| keep[i]).map(|i| points[i]).collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn frame_with_boxes(w: u32, h: u32, boxes: &[(u32, u32, u32, u32)], bright: bool) -> Frame {
        let (bg, fg) = if bright { (20u8, 235u8) } else { (235u8, 20u8) };
        let image = RgbaImage::from_fn(w, h, |x, y| {
            let inside = boxes
                .iter()
                .any(|&(bx, by, bw, bh)| x >= bx && x < bx + bw && y >= by && y < by + bh);
            let v = if inside { fg } else { bg };
            Rgba([v, v, v, 255])
        });
        Frame::new(image, 1)
    }

    /// Bright convex quad (corners in ring order) on a dark background.
    fn frame_with_quad(w: u32, h: u32, quad: [Point; 4]) -> Frame {
        let image = RgbaImage::from_fn(w, h, |x, y| {
            let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let sides: Vec<f32> = (0..4).map(|i| cross(quad[i], quad[(i + 1) % 4], p)).collect();
            let inside = sides.iter().all(|&c| c >= 0.0) || sides.iter().all(|&c| c <= 0.0);
            let v = if inside { 235 } else { 20 };
            Rgba([v, v, v, 255])
        });
        Frame::new(image, 1)
    }

    fn assert_near(p: Point, x: f32, y: f32) {
        assert!(
            (p.x - x).abs() <= 2.0 && (p.y - y).abs() <= 2.0,
            "corner ({:.1},{:.1}) not near ({},{})",
            p.x,
            p.y,
            x,
            y
        );
    }

    #[test]
    fn finds_card_with_target_aspect() -> Result<()> {
        let frame = frame_with_boxes(200, 160, &[(40, 50, 90, 60)], true);
        let mut detector = ContourDetector::new(DetectorOptions::default());

        let features = detector.detect(&frame)?;
        assert_eq!(features.len(), 1);
        let f = features[0];
        assert_near(f.top_left, 40.0, 50.0);
        assert_near(f.top_right, 130.0, 50.0);
        assert_near(f.bottom_left, 40.0, 110.0);
        assert_near(f.bottom_right, 130.0, 110.0);
        Ok(())
    }

    #[test]
    fn finds_card_rotated_45_degrees_under_perspective() -> Result<()> {
        // 120x80 card whose far edge is shrunk to 80%, turned through 44..=46 degrees.
        let local = [(-60.0f32, -40.0f32), (60.0, -40.0), (48.0, 40.0), (-48.0, 40.0)];
        let mut detector = ContourDetector::new(DetectorOptions::default());
        for deg in [44.0f32, 45.0, 46.0] {
            let (sin, cos) = deg.to_radians().sin_cos();
            let quad = local.map(|(x, y)| Point::new(200.0 + x * cos - y * sin, 200.0 + x * sin + y * cos));
            let features = detector.detect(&frame_with_quad(400, 400, quad))?;
            assert_eq!(features.len(), 1, "card at {} degrees", deg);

            let f = features[0];
            let corners = f.corners();
            for i in 0..4 {
                for j in i + 1..4 {
                    assert!(corners[i].distance(corners[j]) > 40.0, "corners collapsed at {} degrees", deg);
                }
            }
            assert!(f.area() > 7_000.0);
        }
        Ok(())
    }

    #[test]
    fn finds_dark_card_on_bright_background() -> Result<()> {
        let frame = frame_with_boxes(200, 160, &[(40, 50, 60, 90)], false);
        let mut detector = ContourDetector::new(DetectorOptions::default());
        assert_eq!(detector.detect(&frame)?.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_square_when_card_aspect_required() -> Result<()> {
        let frame = frame_with_boxes(200, 160, &[(40, 40, 70, 70)], true);
        let mut detector = ContourDetector::new(DetectorOptions::default());
        assert!(detector.detect(&frame)?.is_empty());

        let mut loose = ContourDetector::new(DetectorOptions {
            aspect_ratio: 1.0,
            aspect_tolerance: 0.1,
            ..DetectorOptions::default()
        });
        assert_eq!(loose.detect(&frame)?.len(), 1);
        Ok(())
    }

    #[test]
    fn ignores_uniform_frames_and_border_blobs() -> Result<()> {
        let mut detector = ContourDetector::new(DetectorOptions::default());
        let flat = Frame::new(RgbaImage::from_pixel(64, 64, Rgba([90, 90, 90, 255])), 1);
        assert!(detector.detect(&flat)?.is_empty());

        let clipped = frame_with_boxes(200, 160, &[(0, 50, 90, 60)], true);
        assert!(detector.detect(&clipped)?.is_empty());
        Ok(())
    }

    #[test]
    fn detection_order_follows_raster_order_and_low_accuracy_scales_back() -> Result<()> {
        let frame = frame_with_boxes(320, 200, &[(180, 20, 90, 60), (20, 110, 90, 60)], true);
        let mut detector = ContourDetector::new(DetectorOptions {
            accuracy: Accuracy::Low,
            ..DetectorOptions::default()
        });
        let features = detector.detect(&frame)?;
        assert_eq!(features.len(), 2);
        assert_near(features[0].top_left, 180.0, 20.0);
        assert_near(features[1].top_left, 20.0, 110.0);
        Ok(())
    }

    #[test]
    fn hull_and_approximation_reduce_to_corners() {
        let mut pts = Vec::new();
        for i in 0..=30 {
            let t = i as f32;
            pts.push(Point::new(t, 0.0));
            pts.push(Point::new(t, 20.0));
        }
        for j in 0..=20 {
            pts.push(Point::new(0.0, j as f32));
            pts.push(Point::new(30.0, j as f32));
        }
        pts.push(Point::new(15.0, 10.0));
        let hull = convex_hull(pts);
        assert_eq!(hull.len(), 4);
        assert_eq!(approx_closed_polygon(&hull, 1.0).len(), 4);
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 30 } else { 220 }]));
        let t = otsu_threshold(&gray);
        assert!((30..220).contains(&t));
    }
}
