//! Runtime configuration from environment variables.
//!
//! Every knob defaults to something that works on a stock Raspberry Pi, so
//! a bare `roverd` starts without any setup. `ROVERD_*` variables override
//! individual fields; a `.env` file next to the binary works too. Values
//! that fail to parse are logged and replaced by their defaults rather
//! than aborting startup.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Capture pipeline producing MJPEG on stdout. `{width}`, `{height}`,
/// `{fps}` and `{quality}` expand before the command is spawned.
const DEFAULT_CAPTURE_COMMAND: &str = "libcamera-vid -t 0 --codec mjpeg \
     --width {width} --height {height} --framerate {fps} --quality {quality} -n -o -";

/// How frames get into the stream hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Spawn the capture command and parse its stdout.
    Process,
    /// Loop JPEG files from a directory. For development without a camera.
    Replay,
}

/// A camera mode string that is neither `process` nor `replay`.
#[derive(Debug, Error)]
#[error("unknown camera mode {input:?}, expected \"process\" or \"replay\"")]
pub struct UnknownMode {
    input: String,
}

impl FromStr for CameraMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(CameraMode::Process),
            "replay" => Ok(CameraMode::Replay),
            _ => Err(UnknownMode {
                input: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraMode::Process => "process",
            CameraMode::Replay => "replay",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub mode: CameraMode,
    /// Shell command template, see [`CameraConfig::capture_command`].
    pub command: String,
    /// Frame directory for [`CameraMode::Replay`].
    pub replay_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    pub target_fps: u32,
}

impl CameraConfig {
    /// The capture command with size, rate and quality substituted in.
    /// Commands without placeholders pass through unchanged.
    pub fn capture_command(&self) -> String {
        self.command
            .replace("{width}", &self.width.to_string())
            .replace("{height}", &self.height.to_string())
            .replace("{fps}", &self.target_fps.to_string())
            .replace("{quality}", &self.jpeg_quality.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path of the motor controller, `/dev/ttyUSB0` on a Pi with a
    /// USB-serial adapter, `/dev/ttyACM0` for a directly attached Arduino.
    pub device: String,
    pub baud: u32,
}

#[derive(Debug, Clone)]
pub struct RoverConfig {
    pub http_addr: SocketAddr,
    pub camera: CameraConfig,
    pub serial: SerialConfig,
    /// How long a held command stays valid with no repeat from the browser.
    pub input_timeout: Duration,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            camera: CameraConfig {
                mode: CameraMode::Process,
                command: DEFAULT_CAPTURE_COMMAND.to_string(),
                replay_dir: PathBuf::from("./frames"),
                width: 640,
                height: 480,
                jpeg_quality: 70,
                target_fps: 30,
            },
            serial: SerialConfig {
                device: "/dev/ttyUSB0".to_string(),
                baud: 9600,
            },
            input_timeout: Duration::from_millis(300),
        }
    }
}

impl RoverConfig {
    /// Build the configuration from `ROVERD_*` environment variables,
    /// keeping the default for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_addr: env_parse("ROVERD_HTTP_ADDR", defaults.http_addr),
            camera: CameraConfig {
                mode: env_parse("ROVERD_CAMERA_MODE", defaults.camera.mode),
                command: env_parse("ROVERD_CAMERA_COMMAND", defaults.camera.command),
                replay_dir: std::env::var("ROVERD_REPLAY_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.camera.replay_dir),
                width: env_parse("ROVERD_CAMERA_WIDTH", defaults.camera.width),
                height: env_parse("ROVERD_CAMERA_HEIGHT", defaults.camera.height),
                jpeg_quality: env_parse("ROVERD_CAMERA_QUALITY", defaults.camera.jpeg_quality),
                target_fps: env_parse("ROVERD_CAMERA_FPS", defaults.camera.target_fps),
            },
            serial: SerialConfig {
                device: env_parse("ROVERD_SERIAL_DEVICE", defaults.serial.device),
                baud: env_parse("ROVERD_SERIAL_BAUD", defaults.serial.baud),
            },
            input_timeout: Duration::from_millis(env_parse(
                "ROVERD_INPUT_TIMEOUT_MS",
                defaults.input_timeout.as_millis() as u64,
            )),
        }
    }
}

fn env_parse<T>(key: &str, fallback: T) -> T
where
    T: FromStr + fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("ignoring {key}={raw:?}, keeping {fallback}");
                fallback
            }
        },
        Err(_) => fallback,
    }
}
