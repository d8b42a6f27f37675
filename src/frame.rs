//! Frames and the single-slot hand-off between pipeline stages.
//!
//! - `Frame`: RGBA pixels, an attachment map and an extent. Produced once per
//!   capture, moved through the pipeline, dropped after compositing.
//! - `ComposedFrame`: the composited output of one frame, ready to draw.
//! - `LatestSlot`: bounded single-slot channel. A producer overwrites any
//!   value the consumer has not taken yet, so a slow consumer always sees the
//!   newest frame and older ones are dropped.

use image::RgbaImage;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::geometry::Rect;

/// Frame metadata, propagated from the source (device name, orientation, ...).
pub type Attachments = BTreeMap<String, String>;

pub const ATTACHMENT_SOURCE: &str = "source";
pub const ATTACHMENT_ORIENTATION: &str = "orientation";

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A captured frame. Pixels are only reachable through `pixels()`; nothing in
/// the pipeline keeps a frame past the callback that received it.
pub struct Frame {
    image: RgbaImage,
    attachments: Attachments,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image,
            attachments: Attachments::new(),
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn with_attachment(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attachments.insert(key.to_string(), value.into());
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel-space rectangle covered by the frame.
    pub fn extent(&self) -> Rect {
        Rect::from_size(self.image.width(), self.image.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since the frame was captured.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub(crate) fn set_attachment(&mut self, key: &str, value: impl Into<String>) {
        self.attachments.insert(key.to_string(), value.into());
    }

    pub(crate) fn replace_pixels(&mut self, image: RgbaImage) {
        self.image = image;
    }

    /// Consume the frame, keeping only its pixels.
    pub fn into_pixels(self) -> RgbaImage {
        self.image
    }
}

/// Composited output of one frame.
#[derive(Clone, Debug)]
pub struct ComposedFrame {
    pub image: RgbaImage,
    pub extent: Rect,
    pub sequence: u64,
    pub rectangles: usize,
}

// ----------------------------------------------------------------------------
// LatestSlot: single-slot, latest-wins channel
// ----------------------------------------------------------------------------

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

struct SlotShared<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Single-slot channel. Cloning yields another handle to the same slot.
pub struct LatestSlot<T> {
    shared: Arc<SlotShared<T>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SlotShared {
                state: Mutex::new(SlotState {
                    value: None,
                    closed: false,
                }),
                ready: Condvar::new(),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Store `value`, replacing any value not yet received.
    ///
    /// Returns `false` if the slot is closed; the value is discarded.
    pub fn send(&self, value: T) -> bool {
        let mut state = match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return false;
        }
        if state.value.replace(value).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.sent.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.shared.ready.notify_one();
        true
    }

    /// Take the current value without waiting.
    pub fn try_recv(&self) -> Option<T> {
        let mut state = match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.value.take()
    }

    /// Wait up to `timeout` for a value.
    ///
    /// Returns `None` on timeout, or once the slot is closed and empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.shared.ready.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Close the slot. Pending values can still be received.
    pub fn close(&self) {
        let mut state = match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.closed = true;
        drop(state);
        self.shared.ready.notify_all();
    }

    /// Reopen a closed slot, e.g. when a session restarts.
    pub fn reopen(&self) {
        let mut state = match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        match self.shared.state.lock() {
            Ok(guard) => guard.closed,
            Err(poisoned) => poisoned.into_inner().closed,
        }
    }

    /// Values accepted by `send`.
    pub fn sent(&self) -> u64 {
        self.shared.sent.load(Ordering::Relaxed)
    }

    /// Values overwritten before anyone received them.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn frame_exposes_extent_and_attachments() {
        let frame = Frame::new(RgbaImage::from_pixel(4, 6, Rgba([1, 2, 3, 255])), 7)
            .with_attachment(ATTACHMENT_SOURCE, "stub://test");

        assert_eq!(frame.extent(), Rect::new(0.0, 0.0, 4.0, 6.0));
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.attachment(ATTACHMENT_SOURCE), Some("stub://test"));
        assert_eq!(frame.attachment("missing"), None);
    }

    #[test]
    fn slot_keeps_only_latest_value() {
        let slot = LatestSlot::new();
        assert!(slot.send(1));
        assert!(slot.send(2));
        assert!(slot.send(3));

        assert_eq!(slot.try_recv(), Some(3));
        assert_eq!(slot.try_recv(), None);
        assert_eq!(slot.sent(), 3);
        assert_eq!(slot.dropped(), 2);
    }

    #[test]
    fn closed_slot_rejects_sends_and_wakes_receiver() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        let rx = slot.clone();
        let waiter = std::thread::spawn(move || rx.recv_timeout(Duration::from_secs(5)));

        std::thread::sleep(Duration::from_millis(20));
        slot.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(!slot.send(9));

        slot.reopen();
        assert!(slot.send(10));
        assert_eq!(slot.recv_timeout(Duration::from_millis(10)), Some(10));
    }

    #[test]
    fn recv_times_out_when_empty() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        let started = Instant::now();
        assert_eq!(slot.recv_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
