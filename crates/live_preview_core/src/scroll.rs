//! Keeping the preview viewport aligned with the editor cursor.
//!
//! [`ScrollSync`] turns cursor fractions into at most one outstanding frame
//! request. A newer fraction always replaces the pending request instead of
//! queueing behind it, and the offset is computed from the viewport size at
//! the moment the frame fires.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Identifies one frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Schedules frame-aligned callbacks.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// The scrollable display surface.
pub trait Viewport {
    fn scroll_height(&self) -> f64;
    fn client_height(&self) -> f64;
    fn set_scroll_top(&mut self, offset: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollState {
    Idle,
    PendingFrame { handle: FrameHandle, fraction: f64 },
}

/// Fraction meaning "jumped to the end", always re-applied.
const END_OF_DOCUMENT: f64 = 1.0;

/// Scroll offset for `fraction` of the scrollable range, never negative.
pub fn scroll_offset(scroll_height: f64, client_height: f64, fraction: f64) -> f64 {
    ((scroll_height - client_height).max(0.0) * fraction).floor()
}

#[derive(Debug)]
pub struct ScrollSync {
    state: ScrollState,
    last_fraction: Option<f64>,
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollSync {
    pub fn new() -> Self {
        Self {
            state: ScrollState::Idle,
            last_fraction: None,
        }
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    /// Feed a new cursor fraction. Returns whether a frame was requested.
    ///
    /// Fractions are clamped into `[0, 1]`, non-finite ones are ignored.
    pub fn update(&mut self, fraction: f64, scheduler: &mut dyn FrameScheduler) -> bool {
        if !fraction.is_finite() {
            tracing::debug!(fraction, "Ignoring non-finite cursor fraction");
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        if self.last_fraction == Some(fraction) && fraction != END_OF_DOCUMENT {
            return false;
        }
        self.last_fraction = Some(fraction);

        if let ScrollState::PendingFrame { handle, .. } = self.state {
            scheduler.cancel_frame(handle);
        }
        let handle = scheduler.request_frame();
        self.state = ScrollState::PendingFrame { handle, fraction };
        true
    }

    /// Apply the pending scroll when its frame fires. Returns the applied offset.
    ///
    /// Handles of cancelled requests are ignored.
    pub fn on_frame(&mut self, handle: FrameHandle, viewport: &mut dyn Viewport) -> Option<f64> {
        match self.state {
            ScrollState::PendingFrame {
                handle: pending,
                fraction,
            } if pending == handle => {
                let offset =
                    scroll_offset(viewport.scroll_height(), viewport.client_height(), fraction);
                viewport.set_scroll_top(offset);
                self.state = ScrollState::Idle;
                Some(offset)
            }
            _ => {
                tracing::trace!(handle = handle.id(), "Ignoring stale frame");
                None
            }
        }
    }
}

/// Default frame interval, roughly one display refresh.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// [`FrameScheduler`] backed by tokio timers.
///
/// Each request spawns a timer task that sends its handle on the frame
/// channel once the interval elapses; cancelling aborts the task. Must be
/// used from within a tokio runtime.
pub struct FrameTicker {
    interval: Duration,
    next_id: u64,
    tx: UnboundedSender<FrameHandle>,
    timers: HashMap<FrameHandle, JoinHandle<()>>,
}

impl FrameTicker {
    /// Returns the ticker and the receiving end of its fired frames.
    pub fn new(interval: Duration) -> (Self, UnboundedReceiver<FrameHandle>) {
        let (tx, rx) = unbounded_channel();
        let ticker = Self {
            interval,
            next_id: 0,
            tx,
            timers: HashMap::new(),
        };
        (ticker, rx)
    }
}

impl FrameScheduler for FrameTicker {
    fn request_frame(&mut self) -> FrameHandle {
        self.timers.retain(|_, timer| !timer.is_finished());

        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        let tx = self.tx.clone();
        let interval = self.interval;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            // The receiver is gone when the previewer shut down.
            let _ = tx.send(handle);
        });
        self.timers.insert(handle, timer);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some(timer) = self.timers.remove(&handle) {
            timer.abort();
        }
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.abort();
        }
    }
}
