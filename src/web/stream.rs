//! MJPEG streaming handler.
//!
//! The response is a `multipart/x-mixed-replace` body that never ends:
//! each frame is one part, and the browser replaces the image as parts
//! arrive. Every connected viewer gets its own
//! [`ViewerSession`](crate::hub::ViewerSession) off the hub, so N viewers
//! cost N copies of the part header but share the JPEG payload.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::source::frame_interval;
use crate::state::AppState;
use crate::stream::ThrottleExt;
use crate::types::Frame;

/// Part separator; browsers key on this to split frames.
const BOUNDARY: &str = "frame";

#[derive(Debug, Deserialize)]
pub(crate) struct StreamParams {
    /// Per-viewer frame rate cap. Useful on slow links; `0` and absent
    /// both mean "as fast as the camera".
    max_fps: Option<u32>,
}

pub(crate) async fn mjpeg_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Response {
    let viewer = state.hub.subscribe();
    let parts = match params.max_fps.filter(|fps| *fps > 0) {
        Some(fps) => multipart_parts(viewer.throttle(frame_interval(fps))).boxed(),
        None => multipart_parts(viewer).boxed(),
    };

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

fn multipart_parts(
    frames: impl Stream<Item = Frame>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    frames.map(|frame| {
        let header = format!(
            "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        );
        let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
        part.extend_from_slice(header.as_bytes());
        part.extend_from_slice(&frame.data);
        part.extend_from_slice(b"\r\n");
        Ok(part.freeze())
    })
}
