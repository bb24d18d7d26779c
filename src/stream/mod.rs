//! Stream combinators for viewer delivery.

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
