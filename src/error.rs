//! Error types for capture and drive-command transport.
//!
//! Two failure domains exist and they recover differently, so they get
//! separate enums rather than one catch-all:
//!
//! - [`CameraError`]: the frame source could not produce a frame. The stream
//!   hub degrades to a placeholder frame and keeps serving viewers; nothing
//!   here is fatal.
//! - [`TransportError`]: the serial link to the motor controller misbehaved.
//!   [`TransportError::Busy`] means the write missed its deadline and the
//!   command is dropped (a newer command supersedes it anyway);
//!   [`TransportError::LinkDown`] means the device is gone and the transport
//!   reconnects in the background.
//!
//! Fatal conditions exist only at startup: failing to bind the HTTP
//! listener, or a replay directory with nothing in it. Both surface as
//! plain `anyhow` errors from `main`.

use std::time::Duration;
use thiserror::Error;

/// Result alias for frame-capture operations.
pub type CameraResult<T, E = CameraError> = std::result::Result<T, E>;

/// Errors produced by a frame source.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CameraError {
    #[error("failed to start capture process `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture stream ended unexpectedly")]
    StreamEnded,

    #[error("malformed MJPEG stream: {reason}")]
    Malformed { reason: String },

    #[error("no frame within {duration:?}")]
    Timeout { duration: Duration },

    #[error("capture read failed")]
    Read {
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load replay frames from `{path}`")]
    Replay {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CameraError {
    /// Helper constructor for spawn failures with the offending command line.
    pub fn spawn_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        CameraError::Spawn { command: command.into(), source }
    }

    /// Helper constructor for malformed-stream conditions.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CameraError::Malformed { reason: reason.into() }
    }

    /// Whether the source is expected to produce frames again without
    /// operator intervention. Everything that happens mid-stream qualifies:
    /// the process source respawns its child and the splitter resyncs on the
    /// next start marker. Only a bad replay directory, seen at startup, is
    /// permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            CameraError::Spawn { .. } => true,
            CameraError::StreamEnded => true,
            CameraError::Malformed { .. } => true,
            CameraError::Timeout { .. } => true,
            CameraError::Read { .. } => true,
            CameraError::Replay { .. } => false,
        }
    }
}

/// Errors produced by the serial command transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("serial write missed its {duration:?} deadline")]
    Busy { duration: Duration },

    #[error("serial link down: {reason}")]
    LinkDown {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl TransportError {
    /// Helper constructor for link-down conditions without an io source.
    pub fn link_down(reason: impl Into<String>) -> Self {
        TransportError::LinkDown { reason: reason.into(), source: None }
    }

    /// Helper constructor for link-down conditions caused by an io error.
    pub fn link_down_with_source(reason: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::LinkDown { reason: reason.into(), source: Some(source) }
    }

    /// True when the link itself is gone and a background reconnect is the
    /// right response. `Busy` keeps the link: the write was slow, not dead.
    pub fn is_link_down(&self) -> bool {
        matches!(self, TransportError::LinkDown { .. })
    }
}
