//! Camera Capture Layer
//!
//! Frames arrive from a single producer at the device frame rate. Only the
//! newest undelivered frame is kept; older ones are dropped so the processing
//! thread never works on stale input.

pub mod frame;

pub use frame::RawFrame;

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<RawFrame>,
    closed: bool,
}

/// Single-frame mailbox between the capture source and the processing thread
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    dropped: AtomicU64,
}

impl LatestFrameSlot {
    /// Create an empty, open slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a frame, replacing any frame not yet taken.
    ///
    /// Returns `false` if the slot is closed and the frame was discarded.
    pub fn push(&self, frame: RawFrame) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.frame.replace(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped stale frame");
        }
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Take the pending frame without waiting
    pub fn try_take(&self) -> Option<RawFrame> {
        self.state.lock().frame.take()
    }

    /// Wait up to `timeout` for a frame. Returns `None` on timeout or close.
    pub fn take_timeout(&self, timeout: Duration) -> Option<RawFrame> {
        let mut state = self.state.lock();
        if state.frame.is_none() && !state.closed {
            self.ready.wait_for(&mut state, timeout);
        }
        state.frame.take()
    }

    /// Discard the pending frame, if any
    pub fn clear(&self) {
        self.state.lock().frame = None;
    }

    /// Close the slot; pending and future frames are released
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.frame = None;
        drop(state);
        self.ready.notify_all();
    }

    /// Whether the slot has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of frames replaced before the consumer took them
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
