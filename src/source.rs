//! Frame source abstraction.
//!
//! A [`FrameSource`] produces complete JPEG frames one at a time. Two
//! implementations ship with the crate:
//!
//! - [`ProcessSource`](crate::sources::ProcessSource) spawns a capture
//!   process (`libcamera-vid` by default) and splits the MJPEG stream on
//!   its stdout pipe
//! - [`ReplaySource`](crate::sources::ReplaySource) loops a directory of
//!   stills, for development machines without a camera
//!
//! Sources are infinite. They recover from their own failures where they
//! can (respawning a dead capture process, resyncing a corrupt stream) and
//! surface a [`CameraError`](crate::CameraError) for each lost frame
//! rather than ending the stream. The hub treats those errors as transient:
//! it switches viewers to a placeholder frame and calls
//! [`next_frame`](FrameSource::next_frame) again.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CameraResult;

/// Asynchronous producer of JPEG frames.
///
/// ```
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use roverd::CameraResult;
/// use roverd::source::FrameSource;
///
/// struct Solid(Bytes);
///
/// #[async_trait]
/// impl FrameSource for Solid {
///     async fn next_frame(&mut self) -> CameraResult<Bytes> {
///         Ok(self.0.clone())
///     }
///
///     fn target_fps(&self) -> u32 {
///         30
///     }
/// }
/// ```
#[async_trait]
pub trait FrameSource: Send {
    /// Produce the next complete JPEG frame, waiting for one if necessary.
    ///
    /// An `Err` means one frame was lost, not that the stream is over. The
    /// source is expected to have already started its own recovery (respawn,
    /// resync) by the time the error is returned, so callers can simply call
    /// again.
    async fn next_frame(&mut self) -> CameraResult<Bytes>;

    /// Nominal capture rate in frames per second. Drives the placeholder
    /// cadence while the camera is down.
    fn target_fps(&self) -> u32;
}

/// Period between frames at `fps`, floored to a millisecond so pathological
/// rates never produce the zero period that tokio intervals panic on.
pub(crate) fn frame_interval(fps: u32) -> Duration {
    (Duration::from_secs(1) / fps.max(1)).max(Duration::from_millis(1))
}
