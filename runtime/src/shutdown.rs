//! Cooperative shutdown for the accept loop and connection handlers.
//!
//! ## Architecture
//!
//! - **[`ShutdownCoordinator`]**: owns the signal and waits for the drain
//! - **[`Shutdown`]**: per-task view of the signal, checked between frame cycles
//! - **[`DrainGuard`]**: held by every connection handler until it exits
//! - **[`ShutdownTrigger`]**: cloneable handle that starts the shutdown
//! - **[`wait_for_signal`]**: waits for SIGINT or SIGTERM
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = ShutdownCoordinator::new();
//!
//! let mut shutdown = coordinator.subscribe();
//! let guard = coordinator.drain_guard();
//! tokio::spawn(async move {
//!     let _guard = guard;
//!     while !shutdown.is_shutdown() {
//!         // one frame cycle
//!     }
//! });
//!
//! wait_for_signal().await?;
//! coordinator.shutdown().await; // returns once every guard is dropped
//! ```
//!
//! There is no hard kill: a handler in the middle of a store round-trip is
//! awaited until it completes.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Owns the shutdown signal and tracks outstanding handlers.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    notify: Arc<watch::Sender<bool>>,
    drain_tx: mpsc::Sender<()>,
    drain_rx: mpsc::Receiver<()>,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        let (drain_tx, drain_rx) = mpsc::channel(1);
        Self {
            notify: Arc::new(notify),
            drain_tx,
            drain_rx,
        }
    }

    /// Get a receiver for the shutdown signal.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.notify.subscribe(),
        }
    }

    /// Get a handle that can start the shutdown from another task.
    #[must_use]
    pub fn trigger_handle(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            notify: Arc::clone(&self.notify),
        }
    }

    /// Register one outstanding unit of work.
    ///
    /// [`ShutdownCoordinator::shutdown`] does not return while any guard is
    /// alive.
    #[must_use]
    pub fn drain_guard(&self) -> DrainGuard {
        DrainGuard {
            _tx: self.drain_tx.clone(),
        }
    }

    /// Signal every subscriber and wait for all drain guards to be dropped.
    pub async fn shutdown(self) {
        let Self {
            notify,
            drain_tx,
            mut drain_rx,
        } = self;

        notify.send_replace(true);
        drop(drain_tx);

        info!("Waiting for connection handlers to finish");
        // Nothing is ever sent: recv resolves to None once every guard is gone
        let _ = drain_rx.recv().await;
        info!("All connection handlers finished");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that starts a shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    notify: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Start the shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.notify.send_replace(true) {
            info!("Shutdown requested");
        }
    }
}

/// A task's view of the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Check whether shutdown has started.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown starts.
    ///
    /// Cancel safe. Also returns if the coordinator is gone.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Keeps [`ShutdownCoordinator::shutdown`] waiting until dropped.
#[derive(Debug)]
pub struct DrainGuard {
    _tx: mpsc::Sender<()>,
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
