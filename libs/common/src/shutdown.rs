//! Graceful shutdown
//!
//! Resolves on the first Ctrl+C (SIGINT) or, on Unix, SIGTERM.

use tracing::{info, warn};

/// Signal that ended a [`wait_for_shutdown`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for a shutdown signal
///
/// # Example
///
/// ```ignore
/// coordinator.run(common::shutdown::wait_for_shutdown()).await;
/// ```
pub async fn wait_for_shutdown() -> ShutdownSignal {
    let signal = wait_for_signal().await;
    info!("Shutdown signal received ({})", signal);
    signal
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term_signal = match signal(SignalKind::terminate()) {
        Ok(sig) => Some(sig),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}. Only Ctrl+C will stop the service", e);
            None
        },
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
        _ = async {
            match term_signal.as_mut() {
                Some(sig) => {
                    sig.recv().await;
                },
                None => std::future::pending::<()>().await,
            }
        } => ShutdownSignal::Terminate,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}
