//! Process-wide cancellation
//!
//! A [`ShutdownSignal`] flips once, either when the OS delivers SIGINT or
//! SIGTERM or when a [`ShutdownTrigger`] fires. Every blocking step of the
//! session driver races against it.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, info};

/// Fires the paired [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cancellation signal observed by the driver
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Manually triggered signal pair
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    /// Signal that fires on SIGINT or SIGTERM
    ///
    /// Handlers are installed before this returns, so a signal delivered
    /// afterwards is never lost.
    pub fn from_os_signals() -> std::io::Result<Self> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (trigger, shutdown) = Self::channel();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = trigger.tx.closed() => {
                    debug!("Shutdown signal dropped, stopping signal listener");
                    return;
                }
            }
            trigger.trigger();
        });

        Ok(shutdown)
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    ///
    /// If every trigger is dropped without firing, this never resolves.
    pub async fn wait(&mut self) {
        let fired = self.rx.wait_for(|triggered| *triggered).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_resolves_wait() {
        let (trigger, mut shutdown) = ShutdownSignal::channel();
        assert!(!shutdown.is_triggered());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("wait should resolve after trigger");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_resolves_again_after_trigger() {
        let (trigger, mut shutdown) = ShutdownSignal::channel();
        trigger.trigger();

        shutdown.wait().await;
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .expect("an already-triggered signal resolves immediately");
    }

    #[tokio::test]
    async fn test_dropped_trigger_never_resolves() {
        let (trigger, mut shutdown) = ShutdownSignal::channel();
        drop(trigger);

        let result = tokio::time::timeout(Duration::from_millis(50), shutdown.wait()).await;
        assert!(result.is_err());
    }
}
