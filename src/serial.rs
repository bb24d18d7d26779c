//! Serial command transport.
//!
//! A single task owns the serial link and converges the device on the
//! latest drive intent from the motion controller's watch channel. Input
//! handlers never touch the port; they publish intent and move on.
//!
//! The wire protocol is the motor firmware's: one two-letter ASCII code per
//! line (`fo`, `ba`, `le`, `ri`, `st`), newline-terminated, 9600 baud by
//! default. The firmware reads line by line and ignores lines it does not
//! recognize, which is what makes a timed-out partial write recoverable:
//! the link is marked dirty and the next write leads with a newline, so the
//! stranded fragment parses as a garbage line instead of gluing onto the
//! retried command.
//!
//! Failure handling follows the two [`TransportError`] classes:
//! - a write missing its deadline is `Busy`: the link is kept (dirty) and
//!   the latest intent is retried shortly, unless a newer command replaces
//!   it
//! - an I/O error is `LinkDown`: the link is dropped and reopened in the
//!   background on a fixed cadence, and the current intent is re-sent on
//!   the fresh link
//!
//! On every link open the current intent is written first thing, so a
//! robot that was driving when the cable glitched stops (or resumes) as
//! soon as the link returns. On shutdown a final stop is written
//! best-effort.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_serial::SerialStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::types::{CommandFrame, LinkStatus, MotionCommand};

/// How long a single write may take before it counts as `Busy`.
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_millis(50);

/// How often to attempt a reopen while the link is down.
pub const DEFAULT_RECONNECT_EVERY: Duration = Duration::from_secs(2);

/// Something that can produce a fresh serial link.
///
/// The production implementation is [`SerialOpener`]; tests substitute an
/// in-memory pipe. Called once at startup and again after every link loss.
#[async_trait]
pub trait LinkOpener: Send {
    type Link: AsyncWrite + Unpin + Send;

    async fn open(&mut self) -> Result<Self::Link, TransportError>;
}

/// Opens a real serial device via tokio-serial.
pub struct SerialOpener {
    device: String,
    baud: u32,
}

impl SerialOpener {
    pub fn new(device: impl Into<String>, baud: u32) -> Self {
        Self { device: device.into(), baud }
    }
}

#[async_trait]
impl LinkOpener for SerialOpener {
    type Link = SerialStream;

    async fn open(&mut self) -> Result<SerialStream, TransportError> {
        let builder = tokio_serial::new(&self.device, self.baud);
        #[allow(unused_mut)]
        let mut stream = SerialStream::open(&builder)
            .map_err(|e| TransportError::link_down(format!("{}: {e}", self.device)))?;
        #[cfg(unix)]
        if let Err(error) = stream.set_exclusive(false) {
            debug!(%error, device = %self.device, "cannot clear exclusive mode");
        }
        Ok(stream)
    }
}

/// Handle to the running transport task. Dropping cancels it.
pub struct TransportHandle {
    cancel: CancellationToken,
    status: watch::Receiver<LinkStatus>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Live view of the link health, for the status endpoint.
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Cancel the task and wait for it; the final stop goes out first.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The transport itself: an opener plus timing knobs.
pub struct SerialTransport<O> {
    opener: O,
    write_deadline: Duration,
    reconnect_every: Duration,
}

impl<O> SerialTransport<O>
where
    O: LinkOpener + 'static,
{
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            reconnect_every: DEFAULT_RECONNECT_EVERY,
        }
    }

    pub fn with_write_deadline(mut self, write_deadline: Duration) -> Self {
        self.write_deadline = write_deadline;
        self
    }

    pub fn with_reconnect_every(mut self, reconnect_every: Duration) -> Self {
        self.reconnect_every = reconnect_every;
        self
    }

    /// Spawn the transport task consuming `commands`.
    pub fn spawn(
        self,
        commands: watch::Receiver<CommandFrame>,
        cancel: CancellationToken,
    ) -> TransportHandle {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Down);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(commands, status_tx, task_cancel).await;
        });
        TransportHandle { cancel, status: status_rx, task }
    }

    async fn run(
        mut self,
        mut commands: watch::Receiver<CommandFrame>,
        status: watch::Sender<LinkStatus>,
        cancel: CancellationToken,
    ) {
        let mut link: Option<O::Link> = None;
        let mut sent_seq: Option<u64> = None;
        let mut needs_retry = false;
        // A timed-out write may have left a partial line on the wire; the
        // next write on a dirty link leads with a newline to close it off.
        let mut dirty = false;
        let mut missed = 0u64;
        let mut reconnect = interval(self.reconnect_every);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("serial transport started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = commands.changed() => {
                    if changed.is_err() {
                        debug!("command channel closed");
                        break;
                    }
                    if link.is_none() {
                        missed += 1;
                    }
                }
                _ = reconnect.tick(), if link.is_none() => {
                    match self.opener.open().await {
                        Ok(opened) => {
                            link = Some(opened);
                            sent_seq = None;
                            needs_retry = false;
                            dirty = false;
                            if missed > 0 {
                                debug!(missed, "commands arrived while the link was down");
                                missed = 0;
                            }
                            publish_status(&status, LinkStatus::Up);
                        }
                        Err(error) => {
                            debug!(%error, "serial open failed, retrying");
                        }
                    }
                }
                _ = tokio::time::sleep(self.write_deadline), if link.is_some() && needs_retry => {}
            }

            // Converge the device on the latest intent. Superseded commands
            // are never written; the watch channel already collapsed them.
            let desired = *commands.borrow_and_update();
            if sent_seq == Some(desired.seq) {
                continue;
            }
            let Some(io) = link.as_mut() else { continue };
            let result = timeout(self.write_deadline, async {
                if dirty {
                    io.write_all(b"\n").await?;
                }
                io.write_all(desired.command.wire_line().as_bytes()).await
            })
            .await;
            match result {
                Ok(Ok(())) => {
                    sent_seq = Some(desired.seq);
                    needs_retry = false;
                    dirty = false;
                    debug!(command = %desired.command, seq = desired.seq, "command written");
                }
                Ok(Err(error)) => {
                    warn!(%error, "serial write failed");
                    link = None;
                    sent_seq = None;
                    needs_retry = false;
                    dirty = false;
                    publish_status(&status, LinkStatus::Down);
                }
                Err(_elapsed) => {
                    let error = TransportError::Busy { duration: self.write_deadline };
                    warn!(%error, command = %desired.command, "keeping the link, will retry");
                    needs_retry = true;
                    dirty = true;
                }
            }
        }

        // Best-effort final stop so the robot is not left driving.
        if let Some(io) = link.as_mut() {
            if dirty {
                let _ = timeout(self.write_deadline, io.write_all(b"\n")).await;
            }
            let stop = MotionCommand::Stop.wire_line().as_bytes();
            let _ = timeout(self.write_deadline, io.write_all(stop)).await;
            let _ = timeout(self.write_deadline, io.flush()).await;
        }
        publish_status(&status, LinkStatus::Down);
        info!("serial transport stopped");
    }
}

fn publish_status(status: &watch::Sender<LinkStatus>, new: LinkStatus) {
    let old = status.send_replace(new);
    if old != new {
        match new {
            LinkStatus::Up => info!("serial link up"),
            LinkStatus::Down => warn!("serial link down"),
        }
    }
}
