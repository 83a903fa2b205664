//! End-to-end tests against a real Redis.
//!
//! Run with `cargo test -p flashsale-redis -- --ignored` and a Redis server on
//! `127.0.0.1:6379`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use flashsale_core::inventory::{InventoryAdmin, ProductStatus};
use flashsale_core::purchase::PurchaseResponse;
use flashsale_redis::{RedisEventPublisher, RedisInventoryStore};
use flashsale_runtime::{PurchaseClient, PurchaseEngine, PurchaseServer};
use flashsale_testing::test_clock;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Redis running
async fn test_two_servers_share_one_stock() {
    let admin = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    let product = format!("e2e_{}", std::process::id());
    admin.initialize(&product, 50).await.unwrap();

    // Two independent servers, each with its own store connection
    let mut addrs = Vec::new();
    let mut servers = Vec::new();
    for _ in 0..2 {
        let store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
        let publisher = RedisEventPublisher::connect(REDIS_URL, "flashsale_test_events")
            .await
            .unwrap();
        let engine = Arc::new(PurchaseEngine::new(
            Arc::new(store),
            Arc::new(publisher),
            Arc::new(test_clock()),
        ));
        let server = PurchaseServer::bind("127.0.0.1:0", engine).await.unwrap();
        addrs.push(server.local_addr().unwrap());
        let trigger = server.shutdown_trigger();
        servers.push((trigger, tokio::spawn(server.run())));
    }

    let mut tasks = Vec::new();
    for c in 0..20 {
        let addr = addrs[c % addrs.len()];
        let product = product.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = PurchaseClient::connect(addr).await.unwrap();
            let mut successes = 0_usize;
            for a in 0..25 {
                match client
                    .attempt_purchase(&product, &format!("user_{c}_{a}"))
                    .await
                    .unwrap()
                {
                    PurchaseResponse::Success { .. } => successes += 1,
                    PurchaseResponse::SoldOut => {}
                    PurchaseResponse::Error { error } => panic!("unexpected error: {error}"),
                }
            }
            successes
        }));
    }

    let mut successes = 0;
    for task in tasks {
        successes += task.await.unwrap();
    }
    assert_eq!(successes, 50);

    assert_eq!(
        admin.status(&product).await.unwrap(),
        Some(ProductStatus {
            remaining_stock: 0,
            buyer_count: 50
        })
    );

    for (trigger, handle) in servers {
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
    admin.reset(&product).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_purchase_event_delivered_to_subscriber() {
    let channel = format!("flashsale_events_{}", std::process::id());
    let product = format!("pubsub_{}", std::process::id());

    let admin = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    admin.initialize(&product, 3).await.unwrap();

    let mut pubsub = redis::Client::open(REDIS_URL)
        .unwrap()
        .get_async_pubsub()
        .await
        .unwrap();
    pubsub.subscribe(&channel).await.unwrap();
    let mut messages = Box::pin(pubsub.on_message());

    let store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    let publisher = RedisEventPublisher::connect(REDIS_URL, channel.clone())
        .await
        .unwrap();
    assert_eq!(publisher.channel(), channel);
    let engine = Arc::new(PurchaseEngine::new(
        Arc::new(store),
        Arc::new(publisher),
        Arc::new(test_clock()),
    ));
    let server = PurchaseServer::bind("127.0.0.1:0", engine).await.unwrap();
    let addr = server.local_addr().unwrap();
    let trigger = server.shutdown_trigger();
    let handle = tokio::spawn(server.run());

    let mut client = PurchaseClient::connect(addr).await.unwrap();
    assert_eq!(
        client.attempt_purchase(&product, "alice").await.unwrap(),
        PurchaseResponse::Success { remaining_stock: 2 }
    );

    let message = tokio::time::timeout(Duration::from_secs(5), messages.next())
        .await
        .expect("no event within 5s")
        .expect("subscription closed");
    assert_eq!(message.get_channel_name(), channel);

    let payload: String = message.get_payload().unwrap();
    let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(
        event,
        serde_json::json!({
            "product_id": product.as_str(),
            "buyer": "alice",
            "remaining": 2,
            "timestamp": 1_735_689_600,
        })
    );

    drop(client);
    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    admin.reset(&product).await.unwrap();
}
