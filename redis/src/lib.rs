//! # Flashsale Redis
//!
//! Redis implementations of the flash sale capability traits.
//!
//! - [`RedisInventoryStore`]: [`InventoryStore`](flashsale_core::inventory::InventoryStore)
//!   and [`InventoryAdmin`](flashsale_core::inventory::InventoryAdmin) over a
//!   server-side Lua script
//! - [`RedisEventPublisher`]: [`EventPublisher`](flashsale_core::event::EventPublisher)
//!   over Redis pub/sub
//!
//! ## Record layout
//!
//! ```text
//! product:<id>:stock    string   remaining stock (integer)
//! product:<id>:buyers   list     buyer ids, RPUSH'd in decrement order
//! ```
//!
//! Any number of server processes may share one Redis instance: Redis runs
//! each script invocation to completion before starting the next, which makes
//! the script the single linearization point for every product.

mod inventory;
mod publisher;

pub use inventory::RedisInventoryStore;
pub use publisher::RedisEventPublisher;

use flashsale_core::inventory::StoreError;
use redis::{ErrorKind, RedisError};

/// Key holding the remaining stock of `product_id`.
#[must_use]
pub fn stock_key(product_id: &str) -> String {
    format!("product:{product_id}:stock")
}

/// Key holding the buyer ledger of `product_id`.
#[must_use]
pub fn buyers_key(product_id: &str) -> String {
    format!("product:{product_id}:buyers")
}

/// Classify a Redis failure.
///
/// The detail carries the `redis error:` / `invalid lua response:` prefix a
/// buyer sees in an `ERROR` response.
pub(crate) fn store_error(error: &RedisError) -> StoreError {
    if error.kind() == ErrorKind::TypeError {
        StoreError::InvalidResponse(format!("invalid lua response: {error}"))
    } else if error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
    {
        StoreError::Unavailable(format!("redis error: {error}"))
    } else {
        StoreError::Script(format!("redis error: {error}"))
    }
}
