//! HTTP surface: the control page, the MJPEG stream, and the drive APIs.
//!
//! | Route                 | What it serves                                  |
//! |-----------------------|-------------------------------------------------|
//! | `GET /`               | the control page                                |
//! | `GET /stream`         | MJPEG multipart stream, `?max_fps=N` to cap it  |
//! | `GET /control`        | WebSocket for press/release drive input         |
//! | `POST /control/:dir`  | one-shot press for clients without WebSocket    |
//! | `GET /api/status`     | camera, link, and viewer state as JSON          |
//! | `GET /healthz`        | liveness check                                  |

mod stream;
mod ws;

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::types::{MotionCommand, now_ms};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream::mjpeg_stream))
        .route("/control", get(ws::control_socket))
        .route("/control/:direction", post(ws::control_press))
        .route("/api/status", get(status))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    camera_active: bool,
    robot_connected: bool,
    viewers: u64,
    current_command: MotionCommand,
    last_frame_seq: u64,
    timestamp_ms: i64,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let hub = state.hub.snapshot();
    Json(StatusResponse {
        camera_active: hub.last_frame_seq > 0 && !hub.degraded,
        robot_connected: state.link.borrow().is_up(),
        viewers: hub.viewers,
        current_command: state.controller.current_command(),
        last_frame_seq: hub.last_frame_seq,
        timestamp_ms: now_ms(),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
