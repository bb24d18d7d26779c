//! Frame fan-out hub.
//!
//! One pump task owns the [`FrameSource`]; every HTTP viewer holds a
//! [`ViewerSession`] subscribed to a shared watch channel. The channel keeps
//! only the latest frame, so a slow viewer skips frames instead of building
//! a backlog, and a new viewer starts at the live edge immediately.
//!
//! When the source fails, the hub flips to a degraded mode: a placeholder
//! image is published at the capture cadence until real frames return.
//! Viewer connections stay open the whole time and show "no signal" rather
//! than dying with an error.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::source::{FrameSource, frame_interval};
use crate::types::Frame;

/// Shared hub state. Cheap to clone; all clones observe the same stream.
#[derive(Clone)]
pub struct StreamHub {
    shared: Arc<HubShared>,
}

struct HubShared {
    frames: watch::Sender<Option<Frame>>,
    seq: AtomicU64,
    degraded: AtomicBool,
    viewers: AtomicU64,
    placeholder: Bytes,
}

/// Point-in-time view of the hub for the status endpoint.
#[derive(Debug, Clone)]
pub struct HubSnapshot {
    pub last_frame_seq: u64,
    pub last_frame_timestamp_ms: Option<i64>,
    pub degraded: bool,
    pub viewers: u64,
}

/// Handles for the hub's background tasks. Dropping cancels them.
pub struct HubWorkers {
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

impl HubWorkers {
    /// Cancel both tasks and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.pump).await;
        let _ = (&mut self.keepalive).await;
    }
}

impl Drop for HubWorkers {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StreamHub {
    /// Create a hub that serves `placeholder` while the camera is down.
    pub fn new(placeholder: Bytes) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            shared: Arc::new(HubShared {
                frames,
                seq: AtomicU64::new(0),
                degraded: AtomicBool::new(false),
                viewers: AtomicU64::new(0),
                placeholder,
            }),
        }
    }

    /// Spawn the pump task (owns the source) and the keepalive task (paces
    /// placeholder frames while degraded).
    pub fn spawn<S>(&self, source: S, cancel: CancellationToken) -> HubWorkers
    where
        S: FrameSource + 'static,
    {
        let cadence = frame_interval(source.target_fps());

        let pump_shared = self.shared.clone();
        let pump_cancel = cancel.clone();
        let pump = tokio::spawn(async move {
            pump_task(pump_shared, source, pump_cancel).await;
        });

        let keepalive_shared = self.shared.clone();
        let keepalive_cancel = cancel.clone();
        let keepalive = tokio::spawn(async move {
            keepalive_task(keepalive_shared, cadence, keepalive_cancel).await;
        });

        HubWorkers { cancel, pump, keepalive }
    }

    /// Register a new viewer at the live edge of the stream.
    pub fn subscribe(&self) -> ViewerSession {
        let viewers = self.shared.viewers.fetch_add(1, Ordering::Relaxed) + 1;
        info!(viewers, "viewer connected");
        ViewerSession {
            frames: WatchStream::new(self.shared.frames.subscribe()),
            last_seq: 0,
            _guard: ViewerGuard { shared: self.shared.clone() },
        }
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let latest = self.shared.frames.borrow();
        HubSnapshot {
            last_frame_seq: latest.as_ref().map_or(0, |frame| frame.seq),
            last_frame_timestamp_ms: latest.as_ref().map(|frame| frame.timestamp_ms),
            degraded: self.shared.degraded.load(Ordering::Relaxed),
            viewers: self.shared.viewers.load(Ordering::Relaxed),
        }
    }
}

impl HubShared {
    fn publish(&self, data: Bytes) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.frames.send_replace(Some(Frame::new(data, seq)));
    }
}

async fn pump_task<S: FrameSource>(
    shared: Arc<HubShared>,
    mut source: S,
    cancel: CancellationToken,
) {
    info!("frame pump started");
    let mut frame_count = 0u64;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("frame pump cancelled");
                break;
            }
            result = source.next_frame() => result,
        };

        match result {
            Ok(data) => {
                frame_count += 1;
                if shared.degraded.swap(false, Ordering::Relaxed) {
                    info!("camera recovered");
                }
                shared.publish(data);
                trace!(frame_count, "frame published");
            }
            Err(error) => {
                // Sources pace their own recovery, so no backoff here. The
                // first failure flips to the placeholder immediately; the
                // keepalive task repeats it from then on.
                if !shared.degraded.swap(true, Ordering::Relaxed) {
                    warn!(%error, "camera failed, serving placeholder");
                    shared.publish(shared.placeholder.clone());
                } else {
                    debug!(%error, "camera still failing");
                }
            }
        }
    }

    info!(frame_count, "frame pump ended");
}

async fn keepalive_task(shared: Arc<HubShared>, cadence: Duration, cancel: CancellationToken) {
    let mut ticker = interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if shared.degraded.load(Ordering::Relaxed) {
                    shared.publish(shared.placeholder.clone());
                }
            }
        }
    }
}

/// A viewer's subscription to the frame stream.
///
/// Yields frames in strictly increasing `seq` order, skipping anything the
/// viewer was too slow to collect. The stream never ends on its own; it is
/// dropped when the HTTP response body is, which deregisters the viewer.
pub struct ViewerSession {
    frames: WatchStream<Option<Frame>>,
    last_seq: u64,
    _guard: ViewerGuard,
}

struct ViewerGuard {
    shared: Arc<HubShared>,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let viewers = self.shared.viewers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        info!(viewers, "viewer disconnected");
    }
}

impl Stream for ViewerSession {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let this = self.get_mut();
        loop {
            match ready!(Pin::new(&mut this.frames).poll_next(cx)) {
                None => return Poll::Ready(None),
                Some(None) => continue,
                Some(Some(frame)) => {
                    if frame.seq <= this.last_seq {
                        continue;
                    }
                    this.last_seq = frame.seq;
                    return Poll::Ready(Some(frame));
                }
            }
        }
    }
}
