use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Encoded JPEG frame with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable JPEG bytes - shared by every stream session without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Sequence number assigned by the camera, starting at 1
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, meta: FrameMetadata) -> Self {
        Self {
            data: data.into(),
            meta: Arc::new(meta),
            timestamp: Instant::now(),
        }
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}
