//! Outbound backpressure
//!
//! Outbound frames are accounted in bytes from the moment they are queued
//! until the writer task has pushed them into the transport. Reaching the
//! high-water mark pauses the inbound side; it resumes only once the queue
//! has fully drained.

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FlowState {
    queued: usize,
    paused: bool,
}

#[derive(Debug)]
pub(crate) struct FlowControl {
    high_water_mark: usize,
    state: watch::Sender<FlowState>,
}

impl FlowControl {
    pub(crate) fn new(high_water_mark: usize) -> Self {
        let (state, _) = watch::channel(FlowState::default());
        Self {
            high_water_mark,
            state,
        }
    }

    /// Account for a frame handed to the writer.
    ///
    /// Returns `false` when the queue is at or over the high-water mark, the
    /// same signal a stream write gives when its buffer is full.
    pub(crate) fn queued(&self, len: usize) -> bool {
        let mut writable = true;
        self.state.send_if_modified(|state| {
            state.queued += len;
            if state.queued < self.high_water_mark {
                return false;
            }
            writable = false;
            if state.paused {
                return false;
            }
            debug!(queued = state.queued, "Outbound queue full, pausing reads");
            state.paused = true;
            true
        });
        writable
    }

    /// Account for a frame that left the queue (written or discarded).
    pub(crate) fn drained(&self, len: usize) {
        self.state.send_if_modified(|state| {
            state.queued = state.queued.saturating_sub(len);
            if state.queued > 0 || !state.paused {
                return false;
            }
            debug!("Outbound queue drained, resuming reads");
            state.paused = false;
            true
        });
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub(crate) fn queued_bytes(&self) -> usize {
        self.state.borrow().queued
    }

    /// Wait until reads are allowed again. Returns at once when not paused.
    pub(crate) async fn resumed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| !state.paused).await;
    }
}
