//! Process shutdown signals shared by the fleet binaries

use std::future::Future;

use tracing::error;

/// Future resolving on Ctrl+C or SIGTERM
///
/// The SIGTERM handler is installed when this is called, so a signal that
/// arrives before the future is first polled is not lost.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sig) => Some(sig),
        Err(e) => {
            error!("Failed to install signal handler: {}", e);
            None
        }
    };

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Some(mut sig) => {
                    sig.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }
}
