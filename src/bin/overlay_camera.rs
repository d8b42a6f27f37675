//! overlay_camera - live rectangle overlay daemon
//!
//! This daemon:
//! 1. Opens the configured camera source at the highest preset
//! 2. Detects card-shaped rectangles in every frame on a capture worker
//! 3. Warps a generated overlay onto each rectangle and composites it
//! 4. Renders the newest composited frame to the display surface on the main thread
//! 5. Stops cleanly on Ctrl-C or after `--frames` rendered frames

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use overlay_camera::{
    config::OverlayCameraConfig, Accuracy, CaptureSession, ContourDetector, DetectorRegistry,
    DisplaySurface, FrameProcessor, MemorySurface, PngSurface, Renderer, ScriptedDetector,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (overrides OVERLAY_CAMERA_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Source URI: stub://name, /dev/videoN, file:///path or none://.
    #[arg(long)]
    source: Option<String>,
    /// Stop after this many rendered frames (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Write presented frames as PNG into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Target capture frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Detector accuracy: high or low.
    #[arg(long)]
    accuracy: Option<Accuracy>,
    /// Target rectangle aspect ratio (long side / short side).
    #[arg(long)]
    aspect_ratio: Option<f32>,
    /// Detector backend: contour or scripted (pass-through).
    #[arg(long)]
    detector: Option<String>,
    /// Seed for the overlay noise generator.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => OverlayCameraConfig::load_from(Some(path))?,
        None => OverlayCameraConfig::load()?,
    };
    apply_args(&mut cfg, &args);
    cfg.validate()?;

    let mut registry = DetectorRegistry::new();
    registry.register(ContourDetector::new(cfg.detector.clone()));
    registry.register(ScriptedDetector::default());
    registry.set_default(&cfg.detector_backend)?;
    let detector = registry
        .default_detector()
        .ok_or_else(|| anyhow!("no detector registered"))?;
    detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?
        .warm_up()?;
    log::info!(
        "detector={} accuracy={:?} aspect_ratio={} (available: {})",
        cfg.detector_backend,
        cfg.detector.accuracy,
        cfg.detector.aspect_ratio,
        registry.list().join(", ")
    );

    let processor = FrameProcessor::new(detector, cfg.overlay.clone());
    let session = CaptureSession::new(cfg.camera.clone(), processor);

    let surface = MemorySurface::new(cfg.display.width, cfg.display.height, cfg.display.scale);
    match &cfg.display.output_dir {
        Some(dir) => {
            log::info!("writing presented frames to {}", dir.display());
            let surface = PngSurface::new(surface, dir, cfg.display.every_nth)?;
            run(session, Renderer::new(surface), args.frames)
        }
        None => run(session, Renderer::new(surface), args.frames),
    }
}

fn apply_args(cfg: &mut OverlayCameraConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.camera.uri = source.clone();
    }
    if let Some(fps) = args.fps {
        cfg.camera.target_fps = fps;
    }
    if let Some(accuracy) = args.accuracy {
        cfg.detector.accuracy = accuracy;
    }
    if let Some(ratio) = args.aspect_ratio {
        cfg.detector.aspect_ratio = ratio;
    }
    if let Some(detector) = &args.detector {
        cfg.detector_backend = detector.clone();
    }
    if let Some(seed) = args.seed {
        cfg.overlay.seed = Some(seed);
    }
    if let Some(dir) = &args.output_dir {
        cfg.display.output_dir = Some(dir.clone());
    }
}

fn run<S: DisplaySurface>(
    mut session: CaptureSession,
    mut renderer: Renderer<S>,
    max_frames: u64,
) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    session.start();
    if !session.has_input() {
        log::warn!("no video input; the display will stay blank until Ctrl-C");
    }

    let frames = session.output();
    let mut last_health_log = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = renderer.render_next(&frames, Duration::from_millis(100)) {
            log::error!("render failed: {:#}", e);
        }
        if max_frames > 0 && renderer.rendered() >= max_frames {
            break;
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = session.stats();
            log::info!(
                "source healthy={} captured={} processed={} rendered={} dropped={}",
                stats.source_healthy,
                stats.frames_captured,
                stats.frames_processed,
                renderer.rendered(),
                stats.frames_dropped
            );
            last_health_log = Instant::now();
        }
    }

    session.stop();
    let dropped = frames.dropped();
    if dropped > 0 {
        log::warn!(
            "{} composited frames were replaced before they could be rendered",
            dropped
        );
    }
    log::info!(
        "overlay_camera stopped: rendered {} frames (last sequence {:?})",
        renderer.rendered(),
        renderer.last_sequence()
    );
    Ok(())
}
