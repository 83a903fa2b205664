//! Flash sale purchase server.
//!
//! Configuration comes from the environment (and `.env`), see
//! `flashsale_cli::config`.

use flashsale_cli::config::Config;
use flashsale_core::environment::SystemClock;
use flashsale_redis::{RedisEventPublisher, RedisInventoryStore};
use flashsale_runtime::metrics::MetricsServer;
use flashsale_runtime::{PurchaseEngine, PurchaseServer, wait_for_signal};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    flashsale_cli::init_tracing();

    let config = Config::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        read_timeout = ?config.read_timeout,
        store_timeout = ?config.store_timeout,
        event_channel = %config.event_channel,
        "Starting flash sale server"
    );

    if let Some(addr) = config.metrics_addr {
        MetricsServer::new(addr).start()?;
    }

    // Fatal if Redis is unreachable or rejects the script
    let store = RedisInventoryStore::connect(&config.redis_url).await?;
    let publisher =
        RedisEventPublisher::connect(&config.redis_url, config.event_channel.clone()).await?;

    let engine = Arc::new(
        PurchaseEngine::new(Arc::new(store), Arc::new(publisher), Arc::new(SystemClock))
            .with_store_timeout(config.store_timeout),
    );

    let server = PurchaseServer::bind(&config.listen_addr, engine)
        .await?
        .with_read_timeout(config.read_timeout);

    let trigger = server.shutdown_trigger();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => trigger.trigger(),
            Err(e) => error!(error = %e, "Failed to install signal handlers"),
        }
    });

    server.run().await;
    info!("Server stopped");
    Ok(())
}
