//! Shared state handed to every request handler.

use tokio::sync::watch;

use crate::hub::StreamHub;
use crate::motion::MotionController;
use crate::types::LinkStatus;

/// Cloned into each handler by axum. Every field is a handle onto shared
/// machinery, so clones are cheap and all observe the same service.
#[derive(Clone)]
pub struct AppState {
    pub hub: StreamHub,
    pub controller: MotionController,
    pub link: watch::Receiver<LinkStatus>,
}
