//! Incremental MJPEG frame splitter.
//!
//! The capture process writes a concatenated stream of JPEG images to its
//! stdout pipe. This module carves that byte stream into whole frames by
//! scanning for the JPEG start-of-image (`FF D8`) and end-of-image (`FF D9`)
//! markers, tolerating arbitrary chunk boundaries from the pipe.
//!
//! A bare marker scan is sound for camera output: the entropy-coded payload
//! escapes every `FF` byte (as `FF 00` or an `FF D0..=D7` restart marker),
//! and the frames carry no embedded thumbnails, so `FF D9` can only appear
//! at the true end of a frame.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{CameraError, CameraResult};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on a single buffered frame before the splitter assumes the
/// stream is corrupt and resyncs. Generous for 1080p MJPEG at any quality.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Stateful splitter that turns pipe chunks into complete JPEG frames.
///
/// Feed raw chunks with [`feed`](Self::feed), then drain completed frames
/// with [`next_frame`](Self::next_frame) until it returns `Ok(None)`. Bytes
/// before the first start marker are noise (partial frame from before we
/// attached to the pipe) and are discarded.
#[derive(Debug)]
pub struct FrameSplitter {
    buf: BytesMut,
    /// Next index to examine for an end marker. Only meaningful in-frame;
    /// backs up one byte when the buffer ends mid-marker.
    scan_pos: usize,
    /// True once a start marker sits at `buf[0]`.
    in_frame: bool,
    max_frame_len: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { buf: BytesMut::new(), scan_pos: 0, in_frame: false, max_frame_len }
    }

    /// Append a chunk read from the capture pipe.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes currently buffered without a completed frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Discard all buffered bytes and scan state. Used when the capture
    /// process is replaced: leftover bytes from the dead process must not
    /// be glued onto the new stream.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scan_pos = 0;
        self.in_frame = false;
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Returns [`CameraError::Malformed`] when the in-progress frame exceeds
    /// the configured maximum without an end marker. The buffer is discarded
    /// and scanning resumes at the next start marker, so the error is
    /// transient from the caller's point of view.
    pub fn next_frame(&mut self) -> CameraResult<Option<Bytes>> {
        if !self.in_frame {
            match find_marker(&self.buf, 0, SOI) {
                Some(start) => {
                    if start > 0 {
                        self.buf.advance(start);
                    }
                    self.in_frame = true;
                    self.scan_pos = 2;
                }
                None => {
                    // Keep a trailing FF: it may be the first half of a
                    // start marker split across chunks.
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let junk = self.buf.len() - keep;
                    if junk > 0 {
                        self.buf.advance(junk);
                    }
                    return Ok(None);
                }
            }
        }

        if let Some(end) = find_marker(&self.buf, self.scan_pos, EOI) {
            let frame = self.buf.split_to(end + 2).freeze();
            self.in_frame = false;
            self.scan_pos = 0;
            return Ok(Some(frame));
        }

        if self.buf.len() > self.max_frame_len {
            let buffered = self.buf.len();
            self.buf.clear();
            self.in_frame = false;
            self.scan_pos = 0;
            return Err(CameraError::malformed(format!(
                "no end-of-image marker after {buffered} bytes, resyncing"
            )));
        }

        self.scan_pos = (self.buf.len() - 1).max(2);
        Ok(None)
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    let start = from.min(haystack.len());
    haystack[start..]
        .windows(2)
        .position(|pair| pair == marker)
        .map(|i| i + start)
}
