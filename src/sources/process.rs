//! Frame source backed by an external capture process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{info, warn};

use crate::error::{CameraError, CameraResult};
use crate::mjpeg::{DEFAULT_MAX_FRAME_LEN, FrameSplitter};
use crate::source::FrameSource;

/// First respawn delay after a failure. Doubles per consecutive failure.
const RESPAWN_BASE: Duration = Duration::from_millis(250);

/// Ceiling for the respawn delay. The source retries forever; a camera that
/// comes back after an hour still gets picked up within this interval.
const RESPAWN_CAP: Duration = Duration::from_secs(5);

/// Default time without any stdout bytes before the process is presumed
/// hung and replaced.
const DEFAULT_STALL_AFTER: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 16 * 1024;

/// Bytes of child output tolerated without one completed frame. Catches a
/// child that streams something other than MJPEG, which feeds the stall
/// timer but never yields a frame. Twice the per-frame cap so a maximum
/// size frame plus leading junk cannot trip it.
const MAX_BYTES_WITHOUT_FRAME: usize = 2 * DEFAULT_MAX_FRAME_LEN;

/// Spawns a capture command (via `sh -c`) and splits the MJPEG stream on
/// its stdout pipe into frames.
///
/// The child is killed when the source is dropped. A child that exits,
/// stalls, or produces garbage is torn down and respawned with exponential
/// backoff; each lost frame surfaces as one transient error from
/// [`next_frame`](FrameSource::next_frame).
pub struct ProcessSource {
    command: String,
    target_fps: u32,
    stall_after: Duration,
    splitter: FrameSplitter,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    read_buf: BytesMut,
    retry_at: Option<Instant>,
    failures: u32,
    bytes_since_frame: usize,
}

impl ProcessSource {
    pub fn new(command: String, target_fps: u32) -> Self {
        Self {
            command,
            target_fps,
            stall_after: DEFAULT_STALL_AFTER,
            splitter: FrameSplitter::new(),
            child: None,
            stdout: None,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            retry_at: None,
            failures: 0,
            bytes_since_frame: 0,
        }
    }

    /// Override how long the stdout pipe may stay silent before the child
    /// is presumed hung.
    pub fn with_stall_after(mut self, stall_after: Duration) -> Self {
        self.stall_after = stall_after;
        self
    }

    fn spawn_capture(&mut self) -> CameraResult<ChildStdout> {
        self.splitter.reset();
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                self.schedule_retry();
                return Err(CameraError::spawn_failed(self.command.clone(), source));
            }
        };
        let Some(stdout) = child.stdout.take() else {
            self.schedule_retry();
            return Err(CameraError::spawn_failed(
                self.command.clone(),
                std::io::Error::other("stdout pipe missing"),
            ));
        };

        info!(command = %self.command, "capture process started");
        self.child = Some(child);
        Ok(stdout)
    }

    fn teardown(&mut self, reason: &str) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.splitter.reset();
        self.read_buf.clear();
        self.bytes_since_frame = 0;
        self.schedule_retry();
        warn!(reason, "capture process stopped, will respawn");
    }

    fn schedule_retry(&mut self) {
        let delay = (RESPAWN_BASE * (1u32 << self.failures.min(8))).min(RESPAWN_CAP);
        self.failures = self.failures.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
    }
}

#[async_trait]
impl FrameSource for ProcessSource {
    async fn next_frame(&mut self) -> CameraResult<Bytes> {
        loop {
            if let Some(frame) = self.splitter.next_frame()? {
                self.failures = 0;
                self.bytes_since_frame = 0;
                return Ok(frame);
            }

            if self.bytes_since_frame > MAX_BYTES_WITHOUT_FRAME {
                self.teardown("output carries no frames");
                return Err(CameraError::malformed(format!(
                    "no frame in {MAX_BYTES_WITHOUT_FRAME} bytes of output"
                )));
            }

            if let Some(at) = self.retry_at.take() {
                sleep_until(at).await;
            }

            let mut stdout = match self.stdout.take() {
                Some(stdout) => stdout,
                None => self.spawn_capture()?,
            };

            self.read_buf.reserve(READ_CHUNK);
            let read = timeout(self.stall_after, stdout.read_buf(&mut self.read_buf)).await;
            self.stdout = Some(stdout);

            match read {
                Err(_elapsed) => {
                    self.teardown("no data on stdout");
                    return Err(CameraError::Timeout { duration: self.stall_after });
                }
                Ok(Ok(0)) => {
                    self.teardown("stdout closed");
                    return Err(CameraError::StreamEnded);
                }
                Ok(Ok(n)) => {
                    self.splitter.feed(&self.read_buf);
                    self.read_buf.clear();
                    self.bytes_since_frame += n;
                }
                Ok(Err(source)) => {
                    self.teardown("stdout read failed");
                    return Err(CameraError::Read { source });
                }
            }
        }
    }

    fn target_fps(&self) -> u32 {
        self.target_fps
    }
}
