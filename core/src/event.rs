//! Purchase event notification.
//!
//! Every successful purchase produces one [`PurchaseEvent`], handed to an
//! [`EventPublisher`] after the buyer's response has been decided.
//!
//! # Delivery
//!
//! - **Best-effort**: at most once, no acknowledgement, no retry
//! - **Fire-and-forget**: the purchase path never awaits a publish
//! - **Isolated failures**: a publish error is logged and nothing else
//!
//! Subscribers that need a complete record should read the buyer ledger
//! instead of counting events.
//!
//! # Payload
//!
//! ```text
//! {"product_id": "iphone15", "buyer": "user_42", "remaining": 57, "timestamp": 1735689600}
//! ```

use crate::environment::Clock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Broadcast channel used when none is configured.
pub const DEFAULT_EVENT_CHANNEL: &str = "flashsale_events";

/// Errors that can occur while publishing an event.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// Event could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to hand the event to the channel
    #[error("Publish failed for channel '{channel}': {reason}")]
    Transport {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },
}

/// Notification emitted once per successful purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    /// Product that was sold.
    pub product_id: String,
    /// Buyer recorded in the ledger.
    pub buyer: String,
    /// Stock left after this sale.
    pub remaining: i64,
    /// Unix seconds at which the sale was recorded by this server.
    pub timestamp: i64,
}

impl PurchaseEvent {
    /// Create an event stamped with the given clock.
    #[must_use]
    pub fn new(
        product_id: impl Into<String>,
        buyer: impl Into<String>,
        remaining: i64,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            buyer: buyer.into(),
            remaining,
            timestamp: clock.now().timestamp(),
        }
    }

    /// Encode as the JSON notification payload.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(self).map_err(|e| PublishError::Serialization(e.to_string()))
    }
}

/// Trait for purchase event sinks.
///
/// # Thread Safety
///
/// Publishers are shared across all connections and publish tasks, so
/// implementations must be `Send + Sync`.
///
/// # Dyn Compatibility
///
/// Returns a boxed future so that `Arc<dyn EventPublisher>` can be moved into
/// spawned publish tasks.
pub trait EventPublisher: Send + Sync {
    /// Publish one event to all current subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the event could not be handed off. Callers on
    /// the purchase path log this and move on.
    fn publish<'a>(
        &'a self,
        event: &'a PurchaseEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}
