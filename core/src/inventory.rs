//! Atomic inventory store abstraction.
//!
//! This module provides the [`InventoryStore`] trait, the only path through which
//! product stock is ever mutated, and [`InventoryAdmin`] for the out-of-band
//! product management that operates on the same records.
//!
//! # Data Model
//!
//! Each product is identified by an opaque string id and owns:
//! - a remaining-stock counter (non-negative)
//! - an append-only buyer ledger, in decrement order
//!
//! For every observer, at every point in time:
//!
//! ```text
//! remaining_stock + len(buyer_ledger) == initial_stock
//! ```
//!
//! # Linearization
//!
//! [`InventoryStore::try_decrement`] must be evaluated as one atomic step by the
//! store itself (a server-side script, a compare-and-swap loop, or a serializable
//! transaction). Callers live in independent processes with no shared memory, so
//! client-side locking cannot provide this guarantee.
//!
//! # Implementations
//!
//! - `RedisInventoryStore` (`flashsale-redis`) - Lua script evaluated by Redis
//! - `InMemoryInventoryStore` (`flashsale-testing`) - single in-process lock, for tests

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by the store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur while talking to the inventory store.
///
/// The `Display` text is what a buyer sees in an `ERROR` response. Backends
/// put their own prefix in the detail string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store unreachable or the connection failed mid-request
    #[error("{0}")]
    Unavailable(String),

    /// The atomic operation was rejected or failed while executing
    #[error("{0}")]
    Script(String),

    /// The atomic operation returned something other than `(flag, stock)`
    #[error("{0}")]
    InvalidResponse(String),

    /// The store did not answer within the configured bound
    #[error("store timeout after {0:?}")]
    Timeout(Duration),

    /// Admin attempted to initialise a product with negative stock
    #[error("invalid stock: {0}")]
    InvalidStock(i64),
}

/// Result of one atomic check-and-decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// One unit was taken and the buyer appended to the ledger.
    Purchased {
        /// Stock left after the decrement.
        remaining: i64,
    },
    /// Stock was zero (or the product does not exist); nothing changed.
    SoldOut,
}

impl DecrementOutcome {
    /// Build an outcome from the raw `(decremented, stock)` pair a store returns.
    #[must_use]
    pub const fn from_raw(decremented: bool, stock: i64) -> Self {
        if decremented {
            Self::Purchased { remaining: stock }
        } else {
            Self::SoldOut
        }
    }
}

/// Snapshot of a product record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductStatus {
    /// Units still available.
    pub remaining_stock: i64,
    /// Length of the buyer ledger.
    pub buyer_count: u64,
}

/// The atomic inventory capability used by the purchase path.
///
/// # Thread Safety
///
/// Implementations are shared by every connection handler through
/// `Arc<dyn InventoryStore>` and must be `Send + Sync`.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can be
/// used as a trait object.
pub trait InventoryStore: Send + Sync {
    /// Atomically decrement stock for `product_id` and record `buyer_id`.
    ///
    /// 1. Read the current stock
    /// 2. If stock > 0: decrement, append `buyer_id` to the ledger, return
    ///    [`DecrementOutcome::Purchased`] with the new stock
    /// 3. Otherwise return [`DecrementOutcome::SoldOut`]
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the operation could not be executed. In that
    /// case the caller must not assume either outcome.
    fn try_decrement<'a>(
        &'a self,
        product_id: &'a str,
        buyer_id: &'a str,
    ) -> StoreFuture<'a, DecrementOutcome>;
}

/// Administrative operations on product records.
///
/// These bypass the purchase path and are intended for tooling run before a sale
/// starts or after it ends.
pub trait InventoryAdmin: Send + Sync {
    /// Set the stock for `product_id` and clear its buyer ledger, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStock`] for negative stock, or a transport error.
    fn initialize<'a>(&'a self, product_id: &'a str, stock: i64) -> StoreFuture<'a, ()>;

    /// Read the current stock and ledger length, or `None` if the product does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure.
    fn status<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Option<ProductStatus>>;

    /// Delete the product record. Succeeds when the product does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure.
    fn reset<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, ()>;

    /// List buyers in the order their purchases were applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport failure.
    fn list_buyers<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Vec<String>>;
}
