//! Single-slot, latest-wins frame distribution.
//!
//! The capture loop publishes into one slot; every stream session waits for a
//! version newer than the last one it sent. Frames are never queued: a slow
//! session skips straight to whatever is current when it asks again.

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::capture::Frame;

/// Returned once the broker has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame broker closed")]
pub struct Closed;

#[derive(Default)]
struct Slot {
    version: u64,
    frame: Option<Frame>,
    closed: bool,
}

/// Latest-frame slot shared by the capture loop and every stream session.
pub struct FrameBroker {
    slot: watch::Sender<Slot>,
}

impl FrameBroker {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(Slot::default());
        Self { slot }
    }

    /// Replace the current frame and wake every waiting session.
    ///
    /// Never blocks on consumers. Returns the version assigned to `frame`, or
    /// the last version if the broker is already closed (the frame is dropped).
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut version = 0;
        let stored = self.slot.send_if_modified(|slot| {
            if slot.closed {
                version = slot.version;
                return false;
            }
            slot.version += 1;
            slot.frame = Some(frame);
            version = slot.version;
            true
        });
        if stored {
            metrics::counter!("camstream_frames_published_total").increment(1);
        } else {
            metrics::counter!("camstream_frames_dropped_total").increment(1);
        }
        version
    }

    /// Wait for a frame newer than `since_version`.
    ///
    /// Returns immediately if one is already held. The frame and version are
    /// read together, so a version is never paired with an older frame.
    pub async fn latest(&self, since_version: u64) -> Result<(Frame, u64), Closed> {
        let mut rx = self.slot.subscribe();
        let slot = rx
            .wait_for(|slot| slot.closed || slot.version > since_version)
            .await
            .map_err(|_| Closed)?;

        if slot.closed {
            return Err(Closed);
        }
        match &slot.frame {
            Some(frame) => Ok((frame.clone(), slot.version)),
            None => Err(Closed),
        }
    }

    /// Release every waiting session with [`Closed`]. Idempotent.
    pub fn shutdown(&self) {
        let newly_closed = self.slot.send_if_modified(|slot| {
            let was_open = !slot.closed;
            slot.closed = true;
            // Drop the held frame; nobody can read it any more
            slot.frame = None;
            was_open
        });
        if newly_closed {
            debug!("Frame broker closed at version {}", self.version());
        }
    }

    /// Version of the current frame; 0 before the first publish.
    pub fn version(&self) -> u64 {
        self.slot.borrow().version
    }

    pub fn is_closed(&self) -> bool {
        self.slot.borrow().closed
    }

    /// Number of sessions currently waiting for a frame.
    pub fn waiting(&self) -> usize {
        self.slot.receiver_count()
    }
}

impl Default for FrameBroker {
    fn default() -> Self {
        Self::new()
    }
}
