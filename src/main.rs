//! The roverd daemon: config, camera pipeline, drive pipeline, HTTP.

use anyhow::Context;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use roverd::config::{CameraMode, RoverConfig};
use roverd::hub::StreamHub;
use roverd::motion::MotionController;
use roverd::serial::{SerialOpener, SerialTransport};
use roverd::sources::{ProcessSource, ReplaySource};
use roverd::state::AppState;
use roverd::web;

/// Shown to viewers while the camera is down.
static NO_SIGNAL: &[u8] = include_bytes!("../assets/no_signal.jpg");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roverd=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting roverd v{}", env!("CARGO_PKG_VERSION"));
    let config = RoverConfig::from_env();
    let cancel = CancellationToken::new();

    let hub = StreamHub::new(Bytes::from_static(NO_SIGNAL));
    let workers = match config.camera.mode {
        CameraMode::Process => {
            let command = config.camera.capture_command();
            info!(%command, "camera in process mode");
            hub.spawn(
                ProcessSource::new(command, config.camera.target_fps),
                cancel.child_token(),
            )
        }
        CameraMode::Replay => {
            let dir = &config.camera.replay_dir;
            info!(dir = %dir.display(), "camera in replay mode");
            let source = ReplaySource::open(dir, config.camera.target_fps)
                .await
                .with_context(|| format!("loading replay frames from {}", dir.display()))?;
            hub.spawn(source, cancel.child_token())
        }
    };

    let controller = MotionController::new(config.input_timeout);
    let watchdog = controller.spawn_watchdog(cancel.child_token());
    let transport =
        SerialTransport::new(SerialOpener::new(&config.serial.device, config.serial.baud));
    let serial = transport.spawn(controller.subscribe(), cancel.child_token());

    let app = web::router(AppState {
        hub,
        controller,
        link: serial.status(),
    });

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding http listener on {}", config.http_addr))?;
    info!("listening on http://{}", config.http_addr);

    // Not with_graceful_shutdown: MJPEG connections never drain, so waiting
    // for them would hang the exit. Open streams close with the process.
    tokio::select! {
        result = async { axum::serve(listener, app).await } => result?,
        _ = shutdown_signal() => info!("shutdown signal received"),
    }

    cancel.cancel();
    workers.shutdown().await;
    // Last so the final stop goes out after input is quiesced.
    serial.shutdown().await;
    let _ = watchdog.await;
    info!("shut down cleanly");

    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM from the service manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
