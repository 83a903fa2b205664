//! Redis-backed inventory store.

use crate::{buyers_key, stock_key, store_error};
use flashsale_core::inventory::{
    DecrementOutcome, InventoryAdmin, InventoryStore, ProductStatus, StoreError, StoreFuture,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

/// Atomic check-and-decrement-and-record.
///
/// `KEYS[1]` stock key, `KEYS[2]` buyers key, `ARGV[1]` buyer id.
/// Returns `{1, remaining}` on purchase, `{0, 0}` when sold out or missing.
const TRY_DECREMENT_SCRIPT: &str = r"
local stock = tonumber(redis.call('GET', KEYS[1]))
if stock and stock > 0 then
    local remaining = redis.call('DECR', KEYS[1])
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return {1, remaining}
end
return {0, 0}
";

/// `Redis` inventory store.
///
/// Cloning is cheap; clones share the same multiplexed connection.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisInventoryStore;
/// use flashsale_core::inventory::{InventoryAdmin, InventoryStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisInventoryStore::connect("redis://127.0.0.1:6379").await?;
/// store.initialize("iphone15", 100).await?;
///
/// let outcome = store.try_decrement("iphone15", "user_1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisInventoryStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    script: Script,
}

impl RedisInventoryStore {
    /// Connect, verify the server answers, and load the decrement script.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if `Redis` cannot be reached, or
    /// [`StoreError::Script`] if the script is rejected.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let mut conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn_manager)
            .await
            .map_err(|e| store_error(&e))?;

        let script = Script::new(TRY_DECREMENT_SCRIPT);
        let hash = script
            .prepare_invoke()
            .load_async(&mut conn_manager)
            .await
            .map_err(|e| StoreError::Script(format!("Failed to load decrement script: {e}")))?;

        tracing::info!(script_hash = %hash, "Connected to Redis inventory store");

        Ok(Self {
            conn_manager,
            script,
        })
    }
}

impl InventoryStore for RedisInventoryStore {
    fn try_decrement<'a>(
        &'a self,
        product_id: &'a str,
        buyer_id: &'a str,
    ) -> StoreFuture<'a, DecrementOutcome> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            // EVALSHA, falling back to EVAL if the script cache was flushed
            let (decremented, remaining): (i64, i64) = self
                .script
                .key(stock_key(product_id))
                .key(buyers_key(product_id))
                .arg(buyer_id)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| store_error(&e))?;

            Ok(DecrementOutcome::from_raw(decremented == 1, remaining))
        })
    }
}

impl InventoryAdmin for RedisInventoryStore {
    fn initialize<'a>(&'a self, product_id: &'a str, stock: i64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if stock < 0 {
                return Err(StoreError::InvalidStock(stock));
            }
            let mut conn = self.conn_manager.clone();

            let _: () = redis::pipe()
                .atomic()
                .set(stock_key(product_id), stock)
                .ignore()
                .del(buyers_key(product_id))
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| store_error(&e))?;

            tracing::info!(product_id = %product_id, stock, "Initialized product");
            Ok(())
        })
    }

    fn status<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Option<ProductStatus>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            // MULTI/EXEC so stock and ledger length come from the same instant
            let (stock, buyer_count): (Option<i64>, u64) = redis::pipe()
                .atomic()
                .get(stock_key(product_id))
                .llen(buyers_key(product_id))
                .query_async(&mut conn)
                .await
                .map_err(|e| store_error(&e))?;

            Ok(stock.map(|remaining_stock| ProductStatus {
                remaining_stock,
                buyer_count,
            }))
        })
    }

    fn reset<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            let _: () = conn
                .del(vec![stock_key(product_id), buyers_key(product_id)])
                .await
                .map_err(|e| store_error(&e))?;

            tracing::info!(product_id = %product_id, "Reset product");
            Ok(())
        })
    }

    fn list_buyers<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            let buyers: Vec<String> = conn
                .lrange(buyers_key(product_id), 0, -1)
                .await
                .map_err(|e| store_error(&e))?;

            Ok(buyers)
        })
    }
}
