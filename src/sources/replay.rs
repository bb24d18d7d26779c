//! Frame source that loops a directory of stills.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::error::{CameraError, CameraResult};
use crate::source::{FrameSource, frame_interval};

/// Serves `.jpg`/`.jpeg` files from a directory in name order, forever, at
/// the configured rate. Meant for development machines without a camera;
/// everything downstream of the source behaves exactly as in production.
#[derive(Debug)]
pub struct ReplaySource {
    frames: Vec<Bytes>,
    index: usize,
    ticker: Interval,
    target_fps: u32,
}

impl ReplaySource {
    /// Load every JPEG under `dir` into memory. Fails if the directory is
    /// unreadable or contains no usable frames; that is a configuration
    /// problem, not something worth retrying.
    pub async fn open(dir: impl AsRef<Path>, target_fps: u32) -> CameraResult<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| replay_error(dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| replay_error(dir, e))? {
            let path = entry.path();
            let is_jpeg = path.extension().is_some_and(|ext| {
                ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
            });
            if is_jpeg {
                paths.push(path);
            }
        }
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let data = tokio::fs::read(path).await.map_err(|e| replay_error(path, e))?;
            if !data.starts_with(&[0xFF, 0xD8]) {
                warn!(path = %path.display(), "skipping file without a JPEG start marker");
                continue;
            }
            frames.push(Bytes::from(data));
        }
        if frames.is_empty() {
            return Err(replay_error(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no .jpg or .jpeg frames"),
            ));
        }

        info!(frames = frames.len(), dir = %dir.display(), "replay frames loaded");
        let mut ticker = interval(frame_interval(target_fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self { frames, index: 0, ticker, target_fps })
    }

    /// Number of frames in the loop.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> CameraResult<Bytes> {
        self.ticker.tick().await;
        let frame = self.frames[self.index].clone();
        self.index = (self.index + 1) % self.frames.len();
        Ok(frame)
    }

    fn target_fps(&self) -> u32 {
        self.target_fps
    }
}

fn replay_error(path: &Path, source: std::io::Error) -> CameraError {
    CameraError::Replay { path: path.display().to_string(), source }
}
