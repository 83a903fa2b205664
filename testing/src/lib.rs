//! # Flashsale Testing
//!
//! Testing utilities and in-memory collaborators for the flash sale engine.
//!
//! This crate provides:
//! - [`InMemoryInventoryStore`]: a store with a single in-process linearization point
//! - [`RecordingEventPublisher`] / [`FailingEventPublisher`]: event sinks for assertions
//! - [`FixedClock`]: deterministic event timestamps
//! - [`init_test_tracing`]: opt-in log output for test runs
//!
//! ## Example
//!
//! ```ignore
//! use flashsale_testing::{InMemoryInventoryStore, RecordingEventPublisher, test_clock};
//!
//! #[tokio::test]
//! async fn test_last_unit() {
//!     let store = Arc::new(InMemoryInventoryStore::new().with_product("p1", 1));
//!     let events = Arc::new(RecordingEventPublisher::new());
//!     let engine = PurchaseEngine::new(store.clone(), events.clone(), Arc::new(test_clock()));
//!
//!     let response = engine.attempt_purchase(&PurchaseRequest::new("p1", "u1")).await;
//!     assert_eq!(response, PurchaseResponse::Success { remaining_stock: 0 });
//! }
//! ```

mod inventory_mocks;
mod publisher_mocks;

pub use inventory_mocks::InMemoryInventoryStore;
pub use publisher_mocks::{FailingEventPublisher, RecordingEventPublisher};

use chrono::{DateTime, Utc};
use flashsale_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making event timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use flashsale_testing::mocks::FixedClock;
    /// use flashsale_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};

/// Install a `tracing` subscriber for a test binary.
///
/// Honours `RUST_LOG`; silent by default. Safe to call from every test, only
/// the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}
