//! Core types shared across the capture, motion, and web layers.
//!
//! ## Architecture
//!
//! The type system mirrors the two data paths through the service:
//! - [`Frame`] is a captured JPEG flowing from the camera source through the
//!   stream hub to every connected viewer (zero-copy via [`bytes::Bytes`])
//! - [`MotionCommand`] and [`CommandFrame`] flow from input handlers through
//!   the motion controller to the serial transport
//! - [`LinkStatus`] flows the other way: transport health published back to
//!   the status endpoint
//!
//! Commands are `Copy` and frames clone by reference count, so fan-out to N
//! consumers never copies payload data.
//!
//! ## Usage Example
//!
//! ```rust
//! use roverd::types::{Frame, MotionCommand};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"\xFF\xD8\xFF\xD9"), 1);
//! assert_eq!(frame.len(), 4);
//!
//! // The firmware wire protocol: two ASCII letters plus newline.
//! assert_eq!(MotionCommand::Forward.wire_line(), "fo\n");
//! ```

mod command;
mod frame;
mod link;

// Re-export all public types
pub use command::{CommandFrame, MotionCommand, UnknownCommand};
pub use frame::Frame;
pub(crate) use frame::now_ms;
pub use link::LinkStatus;
