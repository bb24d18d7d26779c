//! Built-in [`FrameSource`](crate::source::FrameSource) implementations.

mod process;
mod replay;

pub use process::ProcessSource;
pub use replay::ReplaySource;
