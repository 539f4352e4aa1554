use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use eyre::{Result, WrapErr};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Why the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested from inside the process
    Requested,
}

/// Bridges OS termination signals to a [`CancellationToken`].
#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
    initiated: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token cancelled once shutdown is initiated.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Relaxed)
    }

    /// Manually trigger shutdown. Returns false if it was already initiated.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!(?reason, "Shutdown initiated");
            self.token.cancel();
            true
        } else {
            tracing::warn!(?reason, "Shutdown already initiated, ignoring");
            false
        }
    }

    /// Wait for SIGINT or SIGTERM (or a manual trigger) and initiate shutdown.
    pub async fn wait(&self) -> Result<ShutdownReason> {
        tracing::info!("Listening for SIGINT and SIGTERM");

        let reason = tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                ShutdownReason::Interrupt
            }
            result = wait_for_sigterm() => {
                result?;
                ShutdownReason::Terminate
            }
            _ = self.token.cancelled() => return Ok(ShutdownReason::Requested),
        };

        self.trigger(reason);
        Ok(reason)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_creation() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_shutdown_initiated());
        assert!(!shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let shutdown = ShutdownSignal::new();
        let token = shutdown.token();

        assert!(shutdown.trigger(ShutdownReason::Requested));
        assert!(!shutdown.trigger(ShutdownReason::Interrupt));
        assert!(shutdown.is_shutdown_initiated());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_returns_on_manual_trigger() {
        let shutdown = ShutdownSignal::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger(ShutdownReason::Requested);

        let reason = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }
}
