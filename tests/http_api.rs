//! HTTP surface tests against the assembled router.
//!
//! Requests go through `tower::ServiceExt::oneshot`, so the full stack
//! runs (routing, extractors, layers) without binding a socket. Streaming
//! bodies are pulled one part at a time with `http_body_util`.

use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use roverd::hub::StreamHub;
use roverd::motion::MotionController;
use roverd::source::FrameSource;
use roverd::state::AppState;
use roverd::types::{LinkStatus, MotionCommand};
use roverd::{CameraError, CameraResult, web};

const PLACEHOLDER: &[u8] = b"\xFF\xD8NOSIG\xFF\xD9";
const JPEG: &[u8] = b"\xFF\xD8LIVE\xFF\xD9";

struct TestDeck {
    state: AppState,
    app: Router,
    link_tx: watch::Sender<LinkStatus>,
}

fn deck() -> TestDeck {
    let (link_tx, link) = watch::channel(LinkStatus::Down);
    let state = AppState {
        hub: StreamHub::new(Bytes::from_static(PLACEHOLDER)),
        controller: MotionController::new(Duration::from_millis(300)),
        link,
    };
    let app = web::router(state.clone());
    TestDeck { state, app, link_tx }
}

/// Yields one scripted frame every 10ms, then hangs like a camera
/// between frames. The pacing keeps the watch channel from collapsing
/// frames before a viewer gets to them.
struct Frames(Vec<Bytes>);

#[async_trait]
impl FrameSource for Frames {
    async fn next_frame(&mut self) -> CameraResult<Bytes> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.0.is_empty() {
            std::future::pending().await
        } else {
            Ok(self.0.remove(0))
        }
    }

    fn target_fps(&self) -> u32 {
        30
    }
}

/// Fails once, then hangs. Enough to flip the hub into degraded mode.
struct DeadCamera {
    failed: bool,
}

#[async_trait]
impl FrameSource for DeadCamera {
    async fn next_frame(&mut self) -> CameraResult<Bytes> {
        if self.failed {
            std::future::pending().await
        } else {
            self.failed = true;
            Err(CameraError::StreamEnded)
        }
    }

    fn target_fps(&self) -> u32 {
        30
    }
}

async fn body_bytes(body: Body) -> Bytes {
    body.collect().await.unwrap().to_bytes()
}

async fn next_part(body: &mut Body) -> Bytes {
    tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for a stream part")
        .expect("stream ended")
        .unwrap()
        .into_data()
        .unwrap()
}

#[tokio::test]
async fn healthz_answers_ok_with_permissive_cors() {
    let deck = deck();
    let response = deck
        .app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header(header::ORIGIN, "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap()),
        Some("*")
    );
    let body = body_bytes(response.into_body()).await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn index_serves_the_control_page() {
    let deck = deck();
    let response = deck
        .app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/html"));

    let body = body_bytes(response.into_body()).await;
    let page = std::str::from_utf8(&body).unwrap();
    assert!(page.contains("videoStream"));
    assert!(page.contains("/control"));
}

#[tokio::test]
async fn status_reports_camera_link_and_input_state() {
    let deck = deck();
    deck.link_tx.send_replace(LinkStatus::Up);
    deck.state.controller.on_input(MotionCommand::Left, true);

    let response = deck
        .app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response.into_body()).await;
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    // No source attached, so no frames yet.
    assert_eq!(status["camera_active"], false);
    assert_eq!(status["last_frame_seq"], 0);
    assert_eq!(status["robot_connected"], true);
    assert_eq!(status["viewers"], 0);
    assert_eq!(status["current_command"], "left");
    assert!(status["timestamp_ms"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn control_press_drives_the_controller() {
    let deck = deck();
    let response = deck
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control/forward")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response.into_body()).await;
    let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["command"], "forward");
    assert_eq!(
        deck.state.controller.current_command(),
        MotionCommand::Forward
    );
}

#[tokio::test]
async fn unknown_directions_are_rejected() {
    let deck = deck();
    let response = deck
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control/sideways")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_bytes(response.into_body()).await;
    let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("sideways"));
    assert_eq!(deck.state.controller.current_command(), MotionCommand::Stop);
}

#[tokio::test]
async fn stream_parts_carry_multipart_framing() {
    let deck = deck();
    let workers = deck.state.hub.spawn(
        Frames(vec![Bytes::from_static(JPEG), Bytes::from_static(JPEG)]),
        CancellationToken::new(),
    );

    let response = deck
        .app
        .oneshot(
            Request::builder()
                .uri("/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

    let mut body = response.into_body();
    for _ in 0..2 {
        let part = next_part(&mut body).await;
        let expected_header = format!(
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            JPEG.len()
        );
        assert!(part.starts_with(expected_header.as_bytes()));
        assert!(part.ends_with(b"\xFF\xD9\r\n"));
    }

    workers.shutdown().await;
}

#[tokio::test]
async fn stream_serves_the_placeholder_while_the_camera_is_down() {
    let deck = deck();
    let workers = deck
        .state
        .hub
        .spawn(DeadCamera { failed: false }, CancellationToken::new());

    let response = deck
        .app
        .oneshot(
            Request::builder()
                .uri("/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let mut body = response.into_body();
    let part = next_part(&mut body).await;
    let expected_header = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        PLACEHOLDER.len()
    );
    assert!(part.starts_with(expected_header.as_bytes()));

    workers.shutdown().await;
}

#[tokio::test]
async fn stream_rate_cap_is_optional() {
    let deck = deck();
    let workers = deck.state.hub.spawn(
        Frames(vec![Bytes::from_static(JPEG)]),
        CancellationToken::new(),
    );

    // max_fps=0 means uncapped rather than an error, and a cap too fast to
    // pace is floored instead of panicking the stream task.
    for uri in [
        "/stream?max_fps=5",
        "/stream?max_fps=0",
        "/stream?max_fps=2000000000",
    ] {
        let response = deck
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();
        let part = next_part(&mut body).await;
        assert!(part.starts_with(b"--frame\r\n"));
    }

    workers.shutdown().await;
}
