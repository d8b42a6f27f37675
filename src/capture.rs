//! Capture session.
//!
//! `CaptureSession` owns the frame source and a background worker. The
//! worker pulls frames, orients them to portrait, runs the `FrameProcessor`
//! on each and pushes the composited result into a `LatestSlot` that the
//! render stage drains.
//!
//! The session has two states. `start()` moves Stopped -> Running and
//! `stop()` moves Running -> Stopped; calling either in its target state
//! does nothing. If no device or input can be opened, `start()` logs the
//! error and the session is Running without input: no frames arrive.

use image::imageops;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::{ComposedFrame, Frame, LatestSlot, ATTACHMENT_ORIENTATION};
use crate::ingest::{open_source, FrameSource, SessionPreset, SourceConfig};
use crate::pipeline::FrameProcessor;

/// Sessions always ask the source for its best quality.
const CAPTURE_PRESET: SessionPreset = SessionPreset::High;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Counters shared between the session and its worker.
#[derive(Default)]
struct Counters {
    captured: AtomicU64,
    processed: AtomicU64,
    source_healthy: AtomicBool,
}

/// Point-in-time session statistics.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub state: SessionState,
    pub has_input: bool,
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub source_healthy: bool,
    pub frames_dropped: u64,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<FrameProcessor>,
}

pub struct CaptureSession {
    config: SourceConfig,
    state: SessionState,
    processor: Option<FrameProcessor>,
    worker: Option<Worker>,
    output: LatestSlot<ComposedFrame>,
    counters: Arc<Counters>,
}

impl CaptureSession {
    pub fn new(config: SourceConfig, processor: FrameProcessor) -> Self {
        Self {
            config,
            state: SessionState::Stopped,
            processor: Some(processor),
            worker: None,
            output: LatestSlot::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// True while a worker is delivering frames. Turns false once the
    /// worker has exited, e.g. after the source failed.
    pub fn has_input(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Handle to the slot composited frames are delivered to.
    pub fn output(&self) -> LatestSlot<ComposedFrame> {
        self.output.clone()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            state: self.state,
            has_input: self.has_input(),
            frames_captured: self.counters.captured.load(Ordering::Relaxed),
            frames_processed: self.counters.processed.load(Ordering::Relaxed),
            source_healthy: self.counters.source_healthy.load(Ordering::Relaxed),
            frames_dropped: self.output.dropped(),
        }
    }

    /// Configure the source and begin delivering frames.
    pub fn start(&mut self) {
        if self.state == SessionState::Running {
            return;
        }
        self.state = SessionState::Running;
        self.output.reopen();

        let source = open_source(&self.config, CAPTURE_PRESET).and_then(|mut source| {
            source.connect()?;
            Ok(source)
        });
        let source = match source {
            Ok(source) => source,
            Err(e) => {
                log::error!(
                    "capture session: no video input from {}: {:#}",
                    self.config.uri,
                    e
                );
                return;
            }
        };
        let Some(processor) = self.processor.take() else {
            log::error!("capture session: frame processor unavailable; running without input");
            return;
        };

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            source,
            processor,
            output: self.output.clone(),
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&stop),
            frame_interval: frame_interval(self.config.target_fps),
        };
        self.counters.source_healthy.store(true, Ordering::Relaxed);

        match std::thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || ctx.run())
        {
            Ok(handle) => {
                log::info!(
                    "capture session running: source={} preset={:?} fps={}",
                    self.config.uri,
                    CAPTURE_PRESET,
                    self.config.target_fps
                );
                self.worker = Some(Worker { stop, handle });
            }
            Err(e) => {
                log::error!("capture session: failed to spawn worker: {}", e);
                self.counters.source_healthy.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Halt capture and release the source.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.state = SessionState::Stopped;
        self.output.close();

        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            match worker.handle.join() {
                Ok(processor) => self.processor = Some(processor),
                Err(_) => log::error!("capture worker panicked; frame processor lost"),
            }
        }
        self.counters.source_healthy.store(false, Ordering::Relaxed);
        log::info!(
            "capture session stopped after {} frames",
            self.counters.captured.load(Ordering::Relaxed)
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(1_000_000 / target_fps as u64)
}

/// Rotate landscape frames a quarter turn clockwise so every frame is portrait.
pub fn orient_portrait(mut frame: Frame) -> Frame {
    if frame.width() > frame.height() {
        let rotated = imageops::rotate90(frame.pixels());
        frame.replace_pixels(rotated);
    }
    frame.set_attachment(ATTACHMENT_ORIENTATION, "portrait");
    frame
}

struct WorkerContext {
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    output: LatestSlot<ComposedFrame>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    frame_interval: Duration,
}

impl WorkerContext {
    fn run(mut self) -> FrameProcessor {
        while !self.stop.load(Ordering::Acquire) {
            let started = Instant::now();
            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("capture worker: {} failed: {:#}", self.source.name(), e);
                    self.counters.source_healthy.store(false, Ordering::Relaxed);
                    break;
                }
            };
            self.counters.captured.fetch_add(1, Ordering::Relaxed);

            let composed = self.processor.on_frame(orient_portrait(frame));
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
            if !self.output.send(composed) {
                break;
            }
            self.counters
                .source_healthy
                .store(self.source.is_healthy(), Ordering::Relaxed);

            if let Some(rest) = self.frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        log::debug!(
            "capture worker exiting: {} frames from {}",
            self.source.stats().frames_captured,
            self.source.name()
        );
        self.processor
    }
}
