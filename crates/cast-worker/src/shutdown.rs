use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Listen for SIGTERM and SIGINT.
///
/// The returned token is cancelled when either arrives.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let fired = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, draining"),
            _ = sigint.recv() => info!("Received SIGINT, draining"),
        }
        fired.cancel();
    });

    Ok(token)
}
