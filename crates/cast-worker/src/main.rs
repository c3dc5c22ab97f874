//! Lecture capture worker binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use cast_media::check_ffmpeg;
use cast_worker::logging::init_tracing;
use cast_worker::shutdown::install_shutdown_handler;
use cast_worker::{
    create_router, metrics, ActionFactory, AppState, ControlPlane, HttpControlPlane, Runner,
    WorkerConfig,
};

/// Per-request timeout for control-plane calls.
const CONTROL_PLANE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(config.log_format, &config.log_level);
    info!("Starting cast-worker {}", config.version);
    info!("Worker config: {:?}", config);

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    match check_ffmpeg() {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => warn!("{}; media actions will fail", e),
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    let port = listener.local_addr()?.port();

    let control_plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(
        &config.control_plane_url,
        CONTROL_PLANE_TIMEOUT,
    )?);
    let factory = ActionFactory::new(
        config.load_templates(),
        config.storage_paths(),
        Arc::clone(&control_plane),
        reqwest::Client::new(),
    )
    .with_ingest_url(config.ingest_url.clone())
    .with_backoff_unit(config.retry_backoff);
    let runner = Arc::new(Runner::new(&config, port, control_plane, factory));

    let shutdown = install_shutdown_handler().context("failed to install signal handlers")?;

    {
        let runner = Arc::clone(&runner);
        let shutdown = shutdown.clone();
        let interval = config.heartbeat_interval;
        tokio::spawn(async move {
            if let Err(e) = runner.register().await {
                error!("{}", e);
                std::process::exit(1);
            }
            runner.run_heartbeat_loop(interval, shutdown).await;
        });
    }

    let app = create_router(AppState::new(Arc::clone(&runner)), metrics_handle);
    info!("Listening on 0.0.0.0:{}", port);

    let drained = {
        let runner = Arc::clone(&runner);
        async move {
            shutdown.cancelled().await;
            runner.drain();
            runner.wait_idle().await;
            info!("All jobs finished");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(drained)
        .await
        .context("server error")?;

    info!("Worker shutdown complete");
    Ok(())
}
