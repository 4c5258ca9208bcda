//! # LabBot Bridge - Application Entry Point
//!
//! Runs the bridge as a standalone process: loads configuration, connects, logs
//! every delivered response, and shuts down on SIGINT/SIGTERM or when the
//! counterpart goes away.

use anyhow::Result;
use labbot_bridge::{AppConfig, BridgeClient, BridgeState};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal set by the SIGINT/SIGTERM handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Starts the bridge connection** and logs every delivered response
/// 4. **Waits** for a shutdown signal or for the connection to close
/// 5. **Stops the connection** and logs the final counters
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting labbot-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: endpoint {} as '{}'",
        config.bridge.endpoint, config.bridge.client_name
    );

    let state = BridgeState::new(config);
    let mut client = BridgeClient::new(state.clone());
    client.on_response_ready(|response| {
        info!(
            text = ?response.text,
            audio_units = response.audio_units.len(),
            durations = ?response.durations,
            animation_tags = ?response.animation_tags,
            total_seconds = response.total_duration_seconds(),
            "Response ready"
        );
    });

    setup_signal_handlers();
    client.start()?;

    tokio::select! {
        _ = client.wait_closed() => {
            error!("Connection closed, shutting down");
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, closing connection...");
        }
    }

    client.stop().await;

    let metrics = state.get_metrics_snapshot();
    info!(
        uptime_seconds = state.get_uptime_seconds(),
        frames_received = metrics.frames_received,
        frames_dropped = metrics.frames_dropped,
        drop_rate = metrics.drop_rate(),
        audio_chunks = metrics.audio_chunks,
        audio_units_decoded = metrics.audio_units_decoded,
        decode_failures = metrics.decode_failures,
        responses_delivered = metrics.responses_delivered,
        acks_sent = metrics.acks_sent,
        "Bridge stopped"
    );
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "labbot_bridge=trace")
/// - If not set, defaults to "labbot_bridge=debug"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labbot_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown.
///
/// When SIGTERM or SIGINT arrives, the global shutdown flag is set.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
        let mut sigint =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!("Failed to install SIGINT handler: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set.
///
/// Polls the flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
