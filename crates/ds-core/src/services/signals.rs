use crate::error::{DevstackError, Result};

/// Interrupt/terminate listener. Handlers are registered on construction so
/// the default "die immediately" behaviour is replaced before any child is
/// spawned.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| DevstackError::Signal(format!("SIGINT handler: {e}")))?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| DevstackError::Signal(format!("SIGTERM handler: {e}")))?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolves with the name of the first signal received.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::error!(error = %e, "ctrl-c handler failed");
                std::future::pending().await
            }
        }
    }
}
