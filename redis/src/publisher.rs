//! Redis pub/sub event publisher.

use flashsale_core::event::{EventPublisher, PublishError, PurchaseEvent};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;

/// Publishes purchase events with `PUBLISH <channel> <json>`.
///
/// Delivery is whatever Redis pub/sub offers: subscribers that are not
/// connected at publish time never see the event.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisEventPublisher;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = RedisEventPublisher::connect("redis://127.0.0.1:6379", "flashsale_events").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisEventPublisher {
    conn_manager: ConnectionManager,
    channel: String,
}

impl RedisEventPublisher {
    /// Connect a publisher for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Transport`] if `Redis` cannot be reached.
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self, PublishError> {
        let channel = channel.into();
        let transport = |reason: String| PublishError::Transport {
            channel: channel.clone(),
            reason,
        };

        let client = Client::open(redis_url)
            .map_err(|e| transport(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            transport(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            conn_manager,
            channel,
        })
    }

    /// Channel events are published on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl EventPublisher for RedisEventPublisher {
    fn publish<'a>(
        &'a self,
        event: &'a PurchaseEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = event.to_json()?;
            let mut conn = self.conn_manager.clone();

            let receivers: u64 = conn
                .publish(&self.channel, payload)
                .await
                .map_err(|e| PublishError::Transport {
                    channel: self.channel.clone(),
                    reason: e.to_string(),
                })?;

            tracing::trace!(
                channel = %self.channel,
                product_id = %event.product_id,
                receivers,
                "Published purchase event"
            );
            Ok(())
        })
    }
}
