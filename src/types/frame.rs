//! Frame types for the stream-based architecture

use bytes::Bytes;

/// A single JPEG frame as it flows through the system.
///
/// This is the fundamental data unit: the capture source produces it, the
/// stream hub publishes it, and every viewer session clones it. The payload
/// is a [`Bytes`] handle, so cloning a frame for N viewers never copies the
/// image data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Complete JPEG image, SOI through EOI.
    pub data: Bytes,

    /// Monotonic frame counter, starting at 1. Seq 0 is reserved for the
    /// hub's "no frame yet" initial state.
    pub seq: u64,

    /// Capture timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl Frame {
    /// Create a new frame stamped with the current wall-clock time.
    pub fn new(data: Bytes, seq: u64) -> Self {
        Self { data, seq, timestamp_ms: now_ms() }
    }

    /// Payload size in bytes, as sent in the multipart `Content-Length`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Milliseconds since the Unix epoch. Saturates at 0 if the clock is set
/// before 1970 rather than panicking.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
