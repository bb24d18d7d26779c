//! Drive intent tracking and the input watchdog.
//!
//! The controller reduces all input events (WebSocket messages, HTTP
//! presses, session closes, watchdog expiry) to a single current drive
//! intent and publishes each change as a [`CommandFrame`] on a watch
//! channel. The serial transport consumes that channel; input handlers
//! never touch the serial port and never block on I/O.
//!
//! State lives behind a plain mutex that is only held for the few
//! instructions of a transition. Emitting onto the watch channel is
//! non-blocking, so holding the lock across it is fine.
//!
//! Rules, in order of what tends to surprise people:
//! - a press of a direction refreshes the watchdog deadline even when the
//!   direction is unchanged, and emits only on change
//! - an explicit stop press always emits, even when already stopped
//! - a release only stops the motion if it matches the direction currently
//!   driving; with overlapping keys, releasing the older key is a no-op
//! - a closed control session always emits a stop, no matter what
//! - the watchdog emits a stop once the deadline passes with no fresh press

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{CommandFrame, MotionCommand};

/// How long a held direction keeps driving without a refreshing press.
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_millis(300);

/// Watchdog granularity. Expiry lands within one tick of the deadline.
const WATCHDOG_TICK: Duration = Duration::from_millis(50);

/// Shared drive-intent state. Cheap to clone; all clones feed the same
/// command channel.
#[derive(Clone)]
pub struct MotionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    state: Mutex<MotionState>,
    commands: watch::Sender<CommandFrame>,
    hold_timeout: Duration,
}

struct MotionState {
    current: MotionCommand,
    deadline: Option<Instant>,
    seq: u64,
}

impl MotionController {
    pub fn new(hold_timeout: Duration) -> Self {
        let (commands, _) = watch::channel(CommandFrame::initial());
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(MotionState {
                    current: MotionCommand::Stop,
                    deadline: None,
                    seq: 0,
                }),
                commands,
                hold_timeout,
            }),
        }
    }

    /// Receiver for the command stream. The transport holds one of these;
    /// intermediate commands may collapse, the latest always survives.
    pub fn subscribe(&self) -> watch::Receiver<CommandFrame> {
        self.inner.commands.subscribe()
    }

    /// The direction currently driving, for the status endpoint.
    pub fn current_command(&self) -> MotionCommand {
        self.lock_state().current
    }

    /// Apply a press (`pressed == true`) or release of a direction.
    pub fn on_input(&self, direction: MotionCommand, pressed: bool) {
        let mut state = self.lock_state();
        if pressed {
            if direction.is_stop() {
                state.current = MotionCommand::Stop;
                state.deadline = None;
                self.emit(&mut state, MotionCommand::Stop);
            } else {
                state.deadline = Some(Instant::now() + self.inner.hold_timeout);
                if state.current != direction {
                    state.current = direction;
                    self.emit(&mut state, direction);
                }
            }
        } else if !direction.is_stop() && state.current == direction {
            state.current = MotionCommand::Stop;
            state.deadline = None;
            self.emit(&mut state, MotionCommand::Stop);
        }
    }

    /// A control session went away. Whatever the state, the robot stops.
    pub fn on_session_closed(&self) {
        let mut state = self.lock_state();
        state.current = MotionCommand::Stop;
        state.deadline = None;
        self.emit(&mut state, MotionCommand::Stop);
        debug!("control session closed, motion stopped");
    }

    /// Spawn the watchdog task. It checks the hold deadline every
    /// [`WATCHDOG_TICK`] and stops the robot when input goes quiet.
    pub fn spawn_watchdog(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(WATCHDOG_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("input watchdog started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => controller.expire_if_stale(Instant::now()),
                }
            }
            debug!("input watchdog stopped");
        })
    }

    fn expire_if_stale(&self, now: Instant) {
        let mut state = self.lock_state();
        let stale = !state.current.is_stop()
            && state.deadline.is_some_and(|deadline| now >= deadline);
        if stale {
            let timed_out = state.current;
            state.current = MotionCommand::Stop;
            state.deadline = None;
            self.emit(&mut state, MotionCommand::Stop);
            warn!(command = %timed_out, "input timeout, motion stopped");
        }
    }

    fn emit(&self, state: &mut MotionState, command: MotionCommand) {
        state.seq += 1;
        let frame = CommandFrame { seq: state.seq, command };
        self.inner.commands.send_replace(frame);
        debug!(command = %command, seq = frame.seq, "drive command");
    }

    fn lock_state(&self) -> MutexGuard<'_, MotionState> {
        // Stops must keep working even if a holder panicked.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(rx: &mut watch::Receiver<CommandFrame>) -> Option<CommandFrame> {
        if rx.has_changed().unwrap() {
            Some(*rx.borrow_and_update())
        } else {
            None
        }
    }

    #[tokio::test]
    async fn press_and_release_emit_direction_then_stop() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Forward, true);
        assert_eq!(
            take(&mut rx),
            Some(CommandFrame { seq: 1, command: MotionCommand::Forward })
        );

        controller.on_input(MotionCommand::Forward, false);
        assert_eq!(
            take(&mut rx),
            Some(CommandFrame { seq: 2, command: MotionCommand::Stop })
        );
    }

    #[tokio::test]
    async fn repeated_press_of_the_same_direction_does_not_reemit() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Left, true);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Left));

        controller.on_input(MotionCommand::Left, true);
        assert_eq!(take(&mut rx), None);
        assert_eq!(controller.current_command(), MotionCommand::Left);
    }

    #[tokio::test]
    async fn overlapping_keys_roll_over_to_the_newest_direction() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Forward, true);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Forward));

        controller.on_input(MotionCommand::Right, true);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Right));

        // Releasing the older key must not cancel the newer one.
        controller.on_input(MotionCommand::Forward, false);
        assert_eq!(take(&mut rx), None);
        assert_eq!(controller.current_command(), MotionCommand::Right);

        controller.on_input(MotionCommand::Right, false);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Stop));
    }

    #[tokio::test]
    async fn explicit_stop_press_always_emits() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Stop, true);
        let first = take(&mut rx).unwrap();
        assert_eq!(first.command, MotionCommand::Stop);

        controller.on_input(MotionCommand::Stop, true);
        let second = take(&mut rx).unwrap();
        assert_eq!(second.command, MotionCommand::Stop);
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn session_close_stops_even_when_already_idle() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_session_closed();
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Stop));
    }

    #[tokio::test]
    async fn stops_from_different_causes_are_distinct_frames() {
        let controller = MotionController::new(DEFAULT_HOLD_TIMEOUT);
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Backward, true);
        controller.on_input(MotionCommand::Backward, false);
        let release_stop = *rx.borrow_and_update();
        controller.on_session_closed();
        let close_stop = *rx.borrow_and_update();

        assert_eq!(release_stop.command, MotionCommand::Stop);
        assert_eq!(close_stop.command, MotionCommand::Stop);
        assert!(close_stop.seq > release_stop.seq);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_stops_motion_when_input_goes_quiet() {
        let controller = MotionController::new(Duration::from_millis(300));
        let cancel = CancellationToken::new();
        let watchdog = controller.spawn_watchdog(cancel.clone());
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Forward, true);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Forward));

        // Before the deadline, nothing.
        tokio::time::sleep(Duration::from_millis(290)).await;
        assert_eq!(take(&mut rx), None);

        // After it, exactly one stop.
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Stop));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(take(&mut rx), None);

        cancel.cancel();
        watchdog.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_press_refreshes_the_watchdog_deadline() {
        let controller = MotionController::new(Duration::from_millis(300));
        let cancel = CancellationToken::new();
        let watchdog = controller.spawn_watchdog(cancel.clone());
        let mut rx = controller.subscribe();

        controller.on_input(MotionCommand::Forward, true);
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Forward));

        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.on_input(MotionCommand::Forward, true);
        assert_eq!(take(&mut rx), None);

        // Without the refresh this would have expired at 300ms.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(take(&mut rx), None);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(take(&mut rx).map(|f| f.command), Some(MotionCommand::Stop));

        cancel.cancel();
        watchdog.await.unwrap();
    }
}
