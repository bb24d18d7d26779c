//! Drive commands and their wire encoding

use serde::{Deserialize, Serialize};

/// A drive command as understood by the motor controller.
///
/// The wire protocol is fixed by the firmware on the other end of the serial
/// link: each command is a two-letter ASCII code followed by a newline. See
/// [`MotionCommand::wire_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl MotionCommand {
    /// The two-letter code the firmware expects, without the trailing newline.
    pub fn wire_code(&self) -> &'static str {
        match self {
            MotionCommand::Forward => "fo",
            MotionCommand::Backward => "ba",
            MotionCommand::Left => "le",
            MotionCommand::Right => "ri",
            MotionCommand::Stop => "st",
        }
    }

    /// The full line written to the serial port.
    pub fn wire_line(&self) -> &'static str {
        match self {
            MotionCommand::Forward => "fo\n",
            MotionCommand::Backward => "ba\n",
            MotionCommand::Left => "le\n",
            MotionCommand::Right => "ri\n",
            MotionCommand::Stop => "st\n",
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, MotionCommand::Stop)
    }

    /// Lowercase name as used in the HTTP and WebSocket APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionCommand::Forward => "forward",
            MotionCommand::Backward => "backward",
            MotionCommand::Left => "left",
            MotionCommand::Right => "right",
            MotionCommand::Stop => "stop",
        }
    }
}

impl std::fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MotionCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(MotionCommand::Forward),
            "backward" => Ok(MotionCommand::Backward),
            "left" => Ok(MotionCommand::Left),
            "right" => Ok(MotionCommand::Right),
            "stop" => Ok(MotionCommand::Stop),
            other => Err(UnknownCommand { input: other.to_string() }),
        }
    }
}

/// Parse error for command names arriving over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{input}`")]
pub struct UnknownCommand {
    pub input: String,
}

/// A command paired with a send sequence number.
///
/// This is what the motion controller publishes and the serial transport
/// consumes. The seq lets the transport tell two
/// consecutive identical commands apart: a Stop issued for a key release and
/// a Stop issued moments later by the watchdog are distinct frames and both
/// must reach the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Monotonic emit counter, starting at 1. Seq 0 marks the initial
    /// "nothing emitted yet" state of the channel.
    pub seq: u64,

    pub command: MotionCommand,
}

impl CommandFrame {
    /// The channel's resting state before any input arrives.
    pub fn initial() -> Self {
        Self { seq: 0, command: MotionCommand::Stop }
    }
}
