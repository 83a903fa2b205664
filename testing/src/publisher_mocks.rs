//! Event publishers for asserting on purchase notifications.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use flashsale_core::event::{EventPublisher, PublishError, PurchaseEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Publisher that records every event it receives.
///
/// Publishing happens on background tasks, so use
/// [`RecordingEventPublisher::wait_for`] before asserting on the events.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<PurchaseEvent>>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<PurchaseEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events recorded so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Check if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` events arrived, or `timeout` elapses.
    ///
    /// Returns `true` if the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish<'a>(
        &'a self,
        event: &'a PurchaseEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        })
    }
}

/// Publisher whose every publish fails.
///
/// Counts the attempts so tests can prove the purchase path still tried.
#[derive(Clone, Debug, Default)]
pub struct FailingEventPublisher {
    attempts: Arc<AtomicU64>,
}

impl FailingEventPublisher {
    /// Create a new failing publisher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish attempts seen
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventPublisher for FailingEventPublisher {
    fn publish<'a>(
        &'a self,
        _event: &'a PurchaseEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PublishError::Transport {
                channel: "test".to_string(),
                reason: "subscriber unreachable".to_string(),
            })
        })
    }
}
