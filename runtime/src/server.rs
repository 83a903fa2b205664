//! TCP accept loop.

use crate::connection::{ConnectionHandler, DEFAULT_READ_TIMEOUT};
use crate::engine::PurchaseEngine;
use crate::shutdown::{ShutdownCoordinator, ShutdownTrigger};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Source of inbound connections.
trait Acceptor {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Errors that prevent the server from starting.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The bound address could not be read back
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Accepts connections and runs one [`ConnectionHandler`] task per connection.
///
/// # Example
///
/// ```ignore
/// let server = PurchaseServer::bind("0.0.0.0:8080", engine).await?;
/// let trigger = server.shutdown_trigger();
///
/// tokio::spawn(async move {
///     wait_for_signal().await.ok();
///     trigger.trigger();
/// });
///
/// server.run().await; // returns after every connection has drained
/// ```
pub struct PurchaseServer {
    listener: TcpListener,
    engine: Arc<PurchaseEngine>,
    coordinator: ShutdownCoordinator,
    read_timeout: Duration,
}

impl PurchaseServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is invalid or in use.
    pub async fn bind(addr: &str, engine: Arc<PurchaseEngine>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            engine,
            coordinator: ShutdownCoordinator::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Set the rolling per-read inactivity timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LocalAddr`] if the OS cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Handle that stops the server when triggered.
    #[must_use]
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.coordinator.trigger_handle()
    }

    /// Accept connections until shutdown is triggered, then drain.
    ///
    /// On shutdown the listener is closed first, then every live handler is
    /// awaited, and finally the engine (and with it the store connection) is
    /// released.
    pub async fn run(self) {
        let Self {
            listener,
            engine,
            coordinator,
            read_timeout,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Purchase server listening");
        }

        accept_loop(&listener, &engine, &coordinator, read_timeout).await;

        drop(listener);
        info!("Stopped accepting connections");

        coordinator.shutdown().await;

        drop(engine);
        info!("Inventory store released");
    }
}

/// Spawn a handler per accepted connection until shutdown is signalled.
///
/// A failed accept is logged and retried after [`ACCEPT_BACKOFF`].
async fn accept_loop<A: Acceptor>(
    acceptor: &A,
    engine: &Arc<PurchaseEngine>,
    coordinator: &ShutdownCoordinator,
    read_timeout: Duration,
) {
    let mut shutdown = coordinator.subscribe();

    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.recv() => break,
            accepted = acceptor.accept() => accepted,
        };

        let (socket, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        if let Err(e) = socket.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            socket,
            peer,
            Arc::clone(engine),
            coordinator.subscribe(),
            read_timeout,
        );
        let guard = coordinator.drain_guard();
        tokio::spawn(async move {
            handler.serve().await;
            drop(guard);
        });
    }
}
