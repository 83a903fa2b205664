//! # Flashsale Runtime
//!
//! Server runtime for the flash sale purchase pipeline.
//!
//! This crate wires the pieces from `flashsale-core` into a running TCP server.
//!
//! ## Core Components
//!
//! - **[`PurchaseEngine`]**: validates a request, runs the atomic decrement, maps the outcome
//! - **[`ConnectionHandler`]**: the `Reading → Processing → Writing` loop of one connection
//! - **[`PurchaseServer`]**: accept loop, one task per connection
//! - **[`ShutdownCoordinator`]**: stops accepting, drains handlers, releases the store
//! - **[`PurchaseClient`]**: the client side of the wire protocol
//!
//! ## Example
//!
//! ```ignore
//! use flashsale_runtime::{PurchaseEngine, PurchaseServer, wait_for_signal};
//!
//! let engine = Arc::new(PurchaseEngine::new(store, publisher, Arc::new(SystemClock)));
//! let server = PurchaseServer::bind("0.0.0.0:8080", engine).await?;
//!
//! let trigger = server.shutdown_trigger();
//! tokio::spawn(async move {
//!     if wait_for_signal().await.is_ok() {
//!         trigger.trigger();
//!     }
//! });
//!
//! server.run().await;
//! ```

/// Protocol client
pub mod client;

/// Per-connection request loop
pub mod connection;

/// Purchase engine
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// TCP accept loop
pub mod server;

/// Graceful shutdown coordination
pub mod shutdown;

pub use client::{ClientError, PurchaseClient};
pub use connection::{ConnectionError, ConnectionHandler, DEFAULT_READ_TIMEOUT};
pub use engine::PurchaseEngine;
pub use server::{PurchaseServer, ServerError};
pub use shutdown::{Shutdown, ShutdownCoordinator, ShutdownTrigger, wait_for_signal};
