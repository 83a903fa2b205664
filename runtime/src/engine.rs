//! Purchase engine: the one place a purchase outcome is decided.
//!
//! ```text
//! frame ──► decode JSON ──► validate ──► InventoryStore::try_decrement
//!                                              │
//!                     ┌────────────────────────┼──────────────────────┐
//!                     ▼                        ▼                      ▼
//!            Purchased{remaining}          SoldOut              StoreError
//!                     │                        │                      │
//!          SUCCESS + spawn publish         SOLD_OUT          ERROR{detail}
//! ```
//!
//! The engine holds no product state and takes no locks: all mutual exclusion
//! between buyers is delegated to the store's atomic operation. Store failures
//! are reported to the caller once and never retried, since a retried
//! decrement could sell a unit twice if the first attempt was in fact applied.

use crate::metrics::{
    EVENTS_PUBLISHED, EVENT_PUBLISH_ERRORS, PURCHASE_ATTEMPTS, PURCHASE_DURATION,
};
use flashsale_core::codec::{ATTEMPT_PURCHASE, Frame};
use flashsale_core::environment::Clock;
use flashsale_core::event::{EventPublisher, PurchaseEvent};
use flashsale_core::inventory::{DecrementOutcome, InventoryStore, StoreError};
use flashsale_core::purchase::{PurchaseRequest, PurchaseResponse, UNKNOWN_MESSAGE_TYPE};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes purchase attempts against the shared inventory store.
///
/// One engine is shared by every connection handler through an `Arc`.
///
/// # Example
///
/// ```ignore
/// let engine = PurchaseEngine::new(store, publisher, Arc::new(SystemClock))
///     .with_store_timeout(Some(Duration::from_millis(500)));
///
/// let response = engine.attempt_purchase(&PurchaseRequest::new("iphone15", "user_1")).await;
/// ```
pub struct PurchaseEngine {
    store: Arc<dyn InventoryStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    /// `None` waits for the store indefinitely
    store_timeout: Option<Duration>,
}

impl PurchaseEngine {
    /// Create an engine with an unbounded store wait.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            store_timeout: None,
        }
    }

    /// Bound every store round-trip by `timeout`.
    ///
    /// An elapsed wait is reported as [`StoreError::Timeout`]. The store may
    /// still have applied the decrement.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Handle one inbound frame and produce the response frame.
    ///
    /// The response always carries the request's type byte, including for
    /// unknown types.
    pub async fn handle_frame(&self, frame: &Frame) -> Frame {
        let response = match frame.kind {
            ATTEMPT_PURCHASE => match PurchaseRequest::from_payload(&frame.payload) {
                Ok(request) => self.attempt_purchase(&request).await,
                Err(reason) => {
                    tracing::debug!(payload_len = frame.payload.len(), "Rejected undecodable request");
                    record_outcome(&PurchaseResponse::error(reason))
                }
            },
            other => {
                tracing::debug!(message_type = other, "Unknown message type");
                PurchaseResponse::error(UNKNOWN_MESSAGE_TYPE)
            }
        };

        Frame::new(frame.kind, response.to_payload())
    }

    /// Attempt to buy one unit of `request.product_id` for `request.user_id`.
    ///
    /// Never fails: validation and store failures become `ERROR` responses.
    pub async fn attempt_purchase(&self, request: &PurchaseRequest) -> PurchaseResponse {
        if let Err(reason) = request.validate() {
            return record_outcome(&PurchaseResponse::error(reason));
        }

        let started = Instant::now();
        let result = self.decrement(request).await;
        metrics::histogram!(PURCHASE_DURATION).record(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(DecrementOutcome::Purchased { remaining }) => {
                tracing::debug!(
                    product_id = %request.product_id,
                    user_id = %request.user_id,
                    remaining,
                    "Purchase succeeded"
                );
                self.publish_in_background(PurchaseEvent::new(
                    request.product_id.as_str(),
                    request.user_id.as_str(),
                    remaining,
                    self.clock.as_ref(),
                ));
                PurchaseResponse::Success {
                    remaining_stock: remaining,
                }
            }
            Ok(DecrementOutcome::SoldOut) => PurchaseResponse::SoldOut,
            Err(e) => {
                tracing::error!(
                    product_id = %request.product_id,
                    error = %e,
                    "Inventory store operation failed"
                );
                PurchaseResponse::error(e.to_string())
            }
        };

        record_outcome(&response)
    }

    async fn decrement(&self, request: &PurchaseRequest) -> Result<DecrementOutcome, StoreError> {
        let attempt = self
            .store
            .try_decrement(&request.product_id, &request.user_id);

        match self.store_timeout {
            None => attempt.await,
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
        }
    }

    /// Hand the event to the publisher on a detached task.
    fn publish_in_background(&self, event: PurchaseEvent) {
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            match publisher.publish(&event).await {
                Ok(()) => {
                    metrics::counter!(EVENTS_PUBLISHED).increment(1);
                }
                Err(e) => {
                    metrics::counter!(EVENT_PUBLISH_ERRORS).increment(1);
                    tracing::warn!(
                        product_id = %event.product_id,
                        buyer = %event.buyer,
                        error = %e,
                        "Failed to publish purchase event"
                    );
                }
            }
        });
    }
}

fn record_outcome(response: &PurchaseResponse) -> PurchaseResponse {
    metrics::counter!(PURCHASE_ATTEMPTS, "outcome" => response.outcome()).increment(1);
    response.clone()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use flashsale_core::purchase::{INVALID_JSON, MISSING_FIELDS};
    use flashsale_testing::{
        FailingEventPublisher, InMemoryInventoryStore, RecordingEventPublisher, test_clock,
    };

    fn engine_with(
        store: &InMemoryInventoryStore,
        publisher: Arc<dyn EventPublisher>,
    ) -> PurchaseEngine {
        PurchaseEngine::new(Arc::new(store.clone()), publisher, Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn test_success_reports_remaining_and_publishes() {
        let store = InMemoryInventoryStore::new().with_product("iphone15", 3);
        let events = RecordingEventPublisher::new();
        let engine = engine_with(&store, Arc::new(events.clone()));

        let response = engine
            .attempt_purchase(&PurchaseRequest::new("iphone15", "user_1"))
            .await;

        assert_eq!(response, PurchaseResponse::Success { remaining_stock: 2 });
        assert!(events.wait_for(1, Duration::from_secs(1)).await);
        assert_eq!(
            events.events()[0],
            PurchaseEvent {
                product_id: "iphone15".to_string(),
                buyer: "user_1".to_string(),
                remaining: 2,
                timestamp: 1_735_689_600,
            }
        );
    }

    #[tokio::test]
    async fn test_same_user_twice_on_last_unit() {
        let store = InMemoryInventoryStore::new().with_product("p1", 1);
        let events = RecordingEventPublisher::new();
        let engine = engine_with(&store, Arc::new(events.clone()));
        let request = PurchaseRequest::new("p1", "u1");

        assert_eq!(
            engine.attempt_purchase(&request).await,
            PurchaseResponse::Success { remaining_stock: 0 }
        );
        assert_eq!(engine.attempt_purchase(&request).await, PurchaseResponse::SoldOut);
        assert_eq!(store.buyers("p1"), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_product_id_never_reaches_store() {
        let store = InMemoryInventoryStore::new().with_product("p1", 1);
        let engine = engine_with(&store, Arc::new(RecordingEventPublisher::new()));

        let response = engine.attempt_purchase(&PurchaseRequest::new("", "u1")).await;

        assert_eq!(response, PurchaseResponse::error(MISSING_FIELDS));
        assert_eq!(store.decrement_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_becomes_error_without_retry() {
        let store = InMemoryInventoryStore::new().with_product("p1", 1);
        store.set_unavailable(true);
        let engine = engine_with(&store, Arc::new(RecordingEventPublisher::new()));

        let response = engine.attempt_purchase(&PurchaseRequest::new("p1", "u1")).await;

        assert_eq!(response, PurchaseResponse::error("connection refused"));
        assert_eq!(store.decrement_calls(), 1);
        assert_eq!(store.stock("p1"), Some(1));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_change_outcome() {
        let store = InMemoryInventoryStore::new().with_product("p1", 2);
        let publisher = FailingEventPublisher::new();
        let engine = engine_with(&store, Arc::new(publisher.clone()));

        let response = engine.attempt_purchase(&PurchaseRequest::new("p1", "u1")).await;
        assert_eq!(response, PurchaseResponse::Success { remaining_stock: 1 });

        for _ in 0..100 {
            if publisher.attempts() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_store_timeout_is_reported() {
        let store = InMemoryInventoryStore::new()
            .with_product("p1", 1)
            .with_latency(Duration::from_millis(200));
        let engine = engine_with(&store, Arc::new(RecordingEventPublisher::new()))
            .with_store_timeout(Some(Duration::from_millis(20)));

        let response = engine.attempt_purchase(&PurchaseRequest::new("p1", "u1")).await;

        assert_eq!(
            response,
            PurchaseResponse::error(StoreError::Timeout(Duration::from_millis(20)).to_string())
        );
    }

    #[tokio::test]
    async fn test_handle_frame_unknown_type_echoes_type() {
        let store = InMemoryInventoryStore::new();
        let engine = engine_with(&store, Arc::new(RecordingEventPublisher::new()));

        let reply = engine.handle_frame(&Frame::new(0x42, b"{}".to_vec())).await;

        assert_eq!(reply.kind, 0x42);
        assert_eq!(
            PurchaseResponse::from_payload(&reply.payload).unwrap(),
            PurchaseResponse::error(UNKNOWN_MESSAGE_TYPE)
        );
    }

    #[tokio::test]
    async fn test_handle_frame_invalid_json() {
        let store = InMemoryInventoryStore::new().with_product("p1", 1);
        let engine = engine_with(&store, Arc::new(RecordingEventPublisher::new()));

        let reply = engine
            .handle_frame(&Frame::new(ATTEMPT_PURCHASE, b"{not json".to_vec()))
            .await;

        assert_eq!(reply.kind, ATTEMPT_PURCHASE);
        assert_eq!(
            PurchaseResponse::from_payload(&reply.payload).unwrap(),
            PurchaseResponse::error(INVALID_JSON)
        );
        assert_eq!(store.stock("p1"), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_never_oversell() {
        let store = InMemoryInventoryStore::new().with_product("hot", 100);
        let events = RecordingEventPublisher::new();
        let engine = Arc::new(engine_with(&store, Arc::new(events.clone())));

        let mut handles = Vec::new();
        for i in 0..2_000 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .attempt_purchase(&PurchaseRequest::new("hot", format!("user_{i}")))
                    .await
            }));
        }

        let mut successes = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                PurchaseResponse::Success { .. } => successes += 1,
                PurchaseResponse::SoldOut => sold_out += 1,
                PurchaseResponse::Error { error } => panic!("unexpected error: {error}"),
            }
        }

        assert_eq!(successes, 100);
        assert_eq!(sold_out, 1_900);
        assert_eq!(store.stock("hot"), Some(0));
        assert_eq!(store.buyers("hot").len(), 100);
        assert!(events.wait_for(100, Duration::from_secs(2)).await);
    }
}
