//! Overlay Camera
//!
//! Live camera pipeline that finds card-shaped rectangles in each frame and
//! paints a perspective-correct overlay onto every one of them.
//!
//! # Architecture
//!
//! Frames flow through three stages:
//!
//! 1. **Capture**: a `CaptureSession` worker pulls frames from a `FrameSource`
//!    and rotates them to portrait.
//! 2. **Process**: the `FrameProcessor` runs a `RectangleDetector`, warps one
//!    generated overlay per detected quad and composites them in order.
//! 3. **Render**: the `Renderer` takes the newest composited frame from a
//!    `LatestSlot` and draws it aspect-fit onto a `DisplaySurface`.
//!
//! Processing is serialized on the capture worker. Rendering happens on the
//! thread that owns the surface. When rendering falls behind, older frames
//! are replaced in the slot and counted as dropped.
//!
//! # Module Structure
//!
//! - `geometry`: points, rects, quads and display fitting
//! - `frame`: frames, composited frames and the latest-wins slot
//! - `ingest`: frame sources (synthetic, still images, V4L2)
//! - `detect`: rectangle detectors and their registry
//! - `overlay`: overlay generation, perspective warp, compositing
//! - `pipeline`, `capture`, `render`: the three stages above
//! - `config`: JSON config file plus environment overrides

pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod render;

pub use capture::{orient_portrait, CaptureSession, CaptureStats, SessionState};
pub use config::{DisplaySettings, OverlayCameraConfig};
pub use detect::{
    Accuracy, ContourDetector, DetectorOptions, DetectorRegistry, RectangleDetector,
    ScriptedDetector, SharedDetector,
};
pub use frame::{ComposedFrame, Frame, LatestSlot};
pub use geometry::{Point, Rect, RectangleFeature, RenderGeometry};
pub use ingest::{open_source, FrameSource, SessionPreset, SourceConfig, SourceStats};
pub use overlay::{OverlayGenerator, OverlayKind, OverlayOptions, PostFilter};
pub use pipeline::FrameProcessor;
pub use render::{DisplaySurface, MemorySurface, PngSurface, Renderer};
