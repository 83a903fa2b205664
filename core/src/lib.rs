//! # Flashsale Core
//!
//! Core traits and types for the flash sale purchase pipeline.
//!
//! This crate provides the pieces every other crate in the workspace agrees on:
//! the wire protocol, the purchase request/response shapes, and the capability
//! traits behind which the atomic inventory store and the event channel live.
//!
//! ## Core Concepts
//!
//! - **Frame**: `[type: u8][length: u32 BE][payload]`, the unit of transmission
//! - **`InventoryStore`**: the single atomic check-and-decrement-and-record operation
//! - **`InventoryAdmin`**: out-of-band product management on the same records
//! - **`EventPublisher`**: fire-and-forget notification of successful purchases
//! - **Clock**: injected time source for event timestamps
//!
//! ## Correctness
//!
//! No type in this crate holds product state. Stock is only ever mutated through
//! [`inventory::InventoryStore::try_decrement`], whose implementations must
//! provide a single linearization point per product.
//!
//! ## Example
//!
//! ```ignore
//! use flashsale_core::inventory::{DecrementOutcome, InventoryStore};
//!
//! async fn buy(store: &dyn InventoryStore) -> Result<(), StoreError> {
//!     match store.try_decrement("iphone15", "user_1").await? {
//!         DecrementOutcome::Purchased { remaining } => println!("{remaining} left"),
//!         DecrementOutcome::SoldOut => println!("sold out"),
//!     }
//!     Ok(())
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod codec;
pub mod event;
pub mod inventory;
pub mod purchase;

/// Environment module - injected dependencies
///
/// Components receive their time source through the [`environment::Clock`] trait
/// so that event timestamps are deterministic in tests.
pub mod environment {
    use super::{DateTime, Utc};

    /// Clock trait for time operations
    ///
    /// # Example
    ///
    /// ```
    /// use flashsale_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert!(clock.now().timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time source used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
