//! In-memory inventory store for fast, deterministic testing.
//!
//! Every operation takes one process-wide lock, which gives the same single
//! linearization point per product that a real store provides with a
//! server-side script.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use flashsale_core::inventory::{
    DecrementOutcome, InventoryAdmin, InventoryStore, ProductStatus, StoreError, StoreFuture,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct ProductRecord {
    stock: i64,
    buyers: Vec<String>,
}

/// In-memory inventory store.
///
/// Clones share the same records, so a test can keep a handle for assertions
/// while the engine owns another.
///
/// # Example
///
/// ```
/// use flashsale_testing::InMemoryInventoryStore;
/// use flashsale_core::inventory::{DecrementOutcome, InventoryStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryInventoryStore::new().with_product("iphone15", 1);
///
/// let outcome = store.try_decrement("iphone15", "user_1").await?;
/// assert_eq!(outcome, DecrementOutcome::Purchased { remaining: 0 });
/// assert_eq!(store.buyers("iphone15"), vec!["user_1".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    products: Arc<Mutex<HashMap<String, ProductRecord>>>,
    unavailable: Arc<AtomicBool>,
    decrement_calls: Arc<AtomicU64>,
    latency: Option<Duration>,
}

impl InMemoryInventoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product with the given stock and an empty ledger
    #[must_use]
    pub fn with_product(self, product_id: &str, stock: i64) -> Self {
        self.records().insert(
            product_id.to_string(),
            ProductRecord {
                stock,
                buyers: Vec::new(),
            },
        );
        self
    }

    /// Delay every `try_decrement` by `latency` before it takes effect
    ///
    /// Simulates the store round-trip, useful for timeout and shutdown tests.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current stock, or `None` if the product does not exist
    #[must_use]
    pub fn stock(&self, product_id: &str) -> Option<i64> {
        self.records().get(product_id).map(|r| r.stock)
    }

    /// Buyer ledger in decrement order
    #[must_use]
    pub fn buyers(&self, product_id: &str) -> Vec<String> {
        self.records()
            .get(product_id)
            .map(|r| r.buyers.clone())
            .unwrap_or_default()
    }

    /// Number of `try_decrement` calls that reached the store
    #[must_use]
    pub fn decrement_calls(&self) -> u64 {
        self.decrement_calls.load(Ordering::SeqCst)
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, ProductRecord>> {
        self.products.lock().unwrap()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn try_decrement<'a>(
        &'a self,
        product_id: &'a str,
        buyer_id: &'a str,
    ) -> StoreFuture<'a, DecrementOutcome> {
        Box::pin(async move {
            self.decrement_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.check_available()?;

            let mut records = self.records();
            match records.get_mut(product_id) {
                Some(record) if record.stock > 0 => {
                    record.stock -= 1;
                    record.buyers.push(buyer_id.to_string());
                    Ok(DecrementOutcome::Purchased {
                        remaining: record.stock,
                    })
                }
                _ => Ok(DecrementOutcome::SoldOut),
            }
        })
    }
}

impl InventoryAdmin for InMemoryInventoryStore {
    fn initialize<'a>(&'a self, product_id: &'a str, stock: i64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            if stock < 0 {
                return Err(StoreError::InvalidStock(stock));
            }
            self.records().insert(
                product_id.to_string(),
                ProductRecord {
                    stock,
                    buyers: Vec::new(),
                },
            );
            Ok(())
        })
    }

    fn status<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Option<ProductStatus>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.records().get(product_id).map(|r| ProductStatus {
                remaining_stock: r.stock,
                buyer_count: r.buyers.len() as u64,
            }))
        })
    }

    fn reset<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.records().remove(product_id);
            Ok(())
        })
    }

    fn list_buyers<'a>(&'a self, product_id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.buyers(product_id))
        })
    }
}
