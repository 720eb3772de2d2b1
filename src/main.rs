//! camstream: MJPEG streaming server for a single vision camera

use std::sync::Arc;

use camstream::capture::{CameraDriver, SyntheticDriver};
use camstream::{CameraBackend, Config, LifecycleController};
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camstream=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("camstream launching...");

    // Load configuration
    let config = Config::load()?;
    let registry = Arc::new(config.registry());
    info!(
        "Profiles available: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );

    match config.capture.backend {
        CameraBackend::Synthetic => {
            let driver = SyntheticDriver::new(config.capture.jpeg_quality);
            stream(driver, registry, &config).await?;
        }
        #[cfg(feature = "v4l2")]
        CameraBackend::V4l2 => {
            use camstream::capture::V4l2Driver;

            // Empty device path means pick the first MJPEG device
            let driver = if config.capture.device.is_empty() {
                V4l2Driver::auto_detect(config.capture.buffer_count)?
            } else {
                V4l2Driver::new(&config.capture.device, config.capture.buffer_count)
            };
            stream(driver, registry, &config).await?;
        }
        #[cfg(not(feature = "v4l2"))]
        CameraBackend::V4l2 => {
            return Err(color_eyre::eyre::eyre!(
                "camstream was built without the `v4l2` feature; set capture.backend = \"synthetic\""
            ));
        }
    }

    info!("camstream shut down");
    Ok(())
}

async fn stream<D: CameraDriver>(
    driver: D,
    registry: Arc<camstream::ProfileRegistry>,
    config: &Config,
) -> Result<()> {
    let mut controller = LifecycleController::new(
        driver,
        registry,
        config.capture.profile.clone(),
        config.server.clone(),
    );
    controller.run(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
