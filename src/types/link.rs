//! Serial link health as observed by the transport task

use serde::Serialize;

/// Whether the serial link to the motor controller is currently usable.
///
/// Published by the transport task over a watch channel so the HTTP status
/// endpoint and the logs see the same view. Starts at [`LinkStatus::Down`]
/// until the first successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Down,
    Up,
}

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Down => f.write_str("down"),
            LinkStatus::Up => f.write_str("up"),
        }
    }
}
