//! Drive input over WebSocket, plus a plain-HTTP fallback.
//!
//! The browser sends one JSON message per key or button edge:
//! `{"direction": "forward", "pressed": true}`. Releases carry
//! `"pressed": false`. The socket handler forwards edges to the
//! [`MotionController`](crate::motion::MotionController) and tells it when
//! the session ends, whatever the reason, so a closed tab never leaves the
//! robot driving.
//!
//! `POST /control/{direction}` exists for curl and for clients without
//! WebSocket support. It only presses; there is no matching release, so
//! motion from this path lasts until the input watchdog stops it.

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::state::AppState;
use crate::types::MotionCommand;

#[derive(Debug, Deserialize)]
struct ControlMessage {
    direction: MotionCommand,
    pressed: bool,
}

pub(crate) async fn control_socket(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    drive_session(state, socket).await;
}

/// Session loop, generic over the message stream so tests can feed it a
/// scripted session without a live socket.
async fn drive_session<S>(state: AppState, messages: S)
where
    S: Stream<Item = Result<Message, axum::Error>>,
{
    debug!("control session opened");
    tokio::pin!(messages);
    while let Some(message) = messages.next().await {
        match message {
            Ok(Message::Text(text)) => apply(&state, &text),
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
            Err(error) => {
                debug!("control session errored: {error}");
                break;
            }
        }
    }
    // However the session ended, the robot must not keep driving.
    state.controller.on_session_closed();
    debug!("control session closed");
}

fn apply(state: &AppState, text: &str) {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(message) => state.controller.on_input(message.direction, message.pressed),
        Err(error) => debug!("ignoring malformed control message: {error}"),
    }
}

pub(crate) async fn control_press(
    State(state): State<AppState>,
    Path(direction): Path<String>,
) -> Response {
    match direction.parse::<MotionCommand>() {
        Ok(command) => {
            state.controller.on_input(command, true);
            Json(json!({ "status": "ok", "command": command })).into_response()
        }
        Err(error) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": error.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::watch;

    use super::*;
    use crate::hub::StreamHub;
    use crate::motion::MotionController;
    use crate::types::LinkStatus;

    fn test_state() -> AppState {
        let (_status, link) = watch::channel(LinkStatus::Down);
        AppState {
            hub: StreamHub::new(Bytes::from_static(b"jpeg")),
            controller: MotionController::new(std::time::Duration::from_millis(300)),
            link,
        }
    }

    #[tokio::test]
    async fn valid_messages_reach_the_controller() {
        let state = test_state();
        let mut commands = state.controller.subscribe();

        apply(&state, r#"{"direction": "forward", "pressed": true}"#);
        assert_eq!(
            commands.borrow_and_update().command,
            MotionCommand::Forward
        );

        apply(&state, r#"{"direction": "forward", "pressed": false}"#);
        assert_eq!(commands.borrow_and_update().command, MotionCommand::Stop);
    }

    #[tokio::test]
    async fn malformed_messages_are_ignored() {
        let state = test_state();
        let commands = state.controller.subscribe();

        apply(&state, "not json");
        apply(&state, r#"{"direction": "sideways", "pressed": true}"#);
        apply(&state, r#"{"direction": "forward"}"#);

        assert!(!commands.has_changed().unwrap());
        assert_eq!(state.controller.current_command(), MotionCommand::Stop);
    }

    #[tokio::test]
    async fn a_vanished_session_stops_the_rover() {
        let state = test_state();
        let mut commands = state.controller.subscribe();

        // The browser disappears mid-hold without ever sending a close.
        let session = futures::stream::iter([Ok(Message::Text(
            r#"{"direction": "forward", "pressed": true}"#.into(),
        ))]);
        drive_session(state.clone(), session).await;

        let last = *commands.borrow_and_update();
        assert_eq!(last.command, MotionCommand::Stop);
        assert_eq!(last.seq, 2);
    }

    #[tokio::test]
    async fn a_close_frame_stops_the_rover() {
        let state = test_state();
        let mut commands = state.controller.subscribe();

        let session = futures::stream::iter([
            Ok(Message::Text(r#"{"direction": "backward", "pressed": true}"#.into())),
            Ok(Message::Close(None)),
        ]);
        drive_session(state.clone(), session).await;

        let last = *commands.borrow_and_update();
        assert_eq!(last.command, MotionCommand::Stop);
        assert_eq!(last.seq, 2);
    }

    #[tokio::test]
    async fn a_socket_error_ends_the_session_with_a_stop() {
        let state = test_state();
        let mut commands = state.controller.subscribe();

        let session = futures::stream::iter([
            Ok(Message::Text(r#"{"direction": "left", "pressed": true}"#.into())),
            Err(axum::Error::new(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))),
            Ok(Message::Text(r#"{"direction": "right", "pressed": true}"#.into())),
        ]);
        drive_session(state.clone(), session).await;

        // seq 2 proves the trailing message never applied: the error ended
        // the session and only the final stop followed the press.
        let last = *commands.borrow_and_update();
        assert_eq!(last.command, MotionCommand::Stop);
        assert_eq!(last.seq, 2);
    }
}
