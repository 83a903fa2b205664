//! # Flashsale CLI
//!
//! Shared pieces of the three flash sale binaries:
//!
//! - `flashsale-server`: the purchase server
//! - `flashsale-admin`: product `init` / `status` / `reset` / `buyers`
//! - `flashsale-loadtest`: concurrent load generator with an oversell check

pub mod config;
pub mod loadtest;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "flashsale=info";

/// Install the global `tracing` subscriber.
///
/// Reads the filter from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
