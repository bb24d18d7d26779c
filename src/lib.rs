//! Web control deck for a small camera rover.
//!
//! Roverd turns a single camera process and a serial motor link into a
//! browser control page: live MJPEG video fanned out to any number of
//! viewers, and press-and-release driving relayed to the motor firmware.
//!
//! # Features
//!
//! - **Shared video**: one capture process feeds every connected viewer
//! - **Degraded mode**: a placeholder card keeps streams alive while the
//!   camera restarts, so browsers never see a broken image
//! - **Edge-based driving**: key and button presses map to firmware
//!   commands; releases and closed tabs stop the rover
//! - **Input watchdog**: motion expires on its own when input goes quiet
//!
//! # Quick Start
//!
//! The `roverd` binary wires everything from environment configuration.
//! Embedding the library looks like this:
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use roverd::hub::StreamHub;
//! use roverd::motion::MotionController;
//! use roverd::serial::{SerialOpener, SerialTransport};
//! use roverd::sources::ReplaySource;
//! use roverd::state::AppState;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cancel = CancellationToken::new();
//!
//!     let hub = StreamHub::new(Bytes::from(std::fs::read("assets/no_signal.jpg")?));
//!     let camera = ReplaySource::open("./frames", 30).await?;
//!     let _workers = hub.spawn(camera, cancel.child_token());
//!
//!     let controller = MotionController::new(Duration::from_millis(300));
//!     let _watchdog = controller.spawn_watchdog(cancel.child_token());
//!
//!     let transport = SerialTransport::new(SerialOpener::new("/dev/ttyUSB0", 9600));
//!     let serial = transport.spawn(controller.subscribe(), cancel.child_token());
//!
//!     let app = roverd::web::router(AppState {
//!         hub,
//!         controller,
//!         link: serial.status(),
//!     });
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod types;

// Camera pipeline
pub mod hub;
pub mod mjpeg;
pub mod source;
pub mod sources;
pub mod stream;

// Drive pipeline
pub mod motion;
pub mod serial;

// HTTP surface
pub mod config;
pub mod state;
pub mod web;

// Core exports
pub use error::{CameraError, CameraResult, TransportError};
pub use types::{CommandFrame, Frame, LinkStatus, MotionCommand};

// Camera exports
pub use hub::{StreamHub, ViewerSession};
pub use source::FrameSource;
pub use sources::{ProcessSource, ReplaySource};

// Drive exports
pub use motion::MotionController;
pub use serial::{LinkOpener, SerialOpener, SerialTransport, TransportHandle};

// HTTP exports
pub use config::RoverConfig;
pub use state::AppState;
