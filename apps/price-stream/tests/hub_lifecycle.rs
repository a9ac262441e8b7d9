//! Broadcast Hub Integration Tests
//!
//! Registration, removal and fan-out racing against each other.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use price_stream::{
    BroadcastConfig, BroadcastHub, HubError, HubHandle, PriceChanged, RemovalReason,
};
use rust_decimal::Decimal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn spawn_hub(config: BroadcastConfig) -> (HubHandle, CancellationToken, tokio::task::JoinHandle<()>) {
    let (hub, handle) = BroadcastHub::new(config);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(hub.run(cancel.clone()));
    (handle, cancel, task)
}

fn price(asset: &str, value: i64) -> PriceChanged {
    PriceChanged::now(asset, Decimal::new(value, 0))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nothing_is_delivered_after_removal() {
    let (hub, cancel, task) = spawn_hub(BroadcastConfig::default());

    let publisher = {
        let hub = hub.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut value = 0;
            while !cancel.is_cancelled() {
                value += 1;
                if hub.publish(price("white_wool", value)).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut subscribers = Vec::new();
    for n in 0..32u64 {
        let hub = hub.clone();
        subscribers.push(tokio::spawn(async move {
            let queue = hub.new_queue();
            let id = hub.register(Arc::clone(&queue)).await.unwrap();

            for _ in 0..=(n % 4) {
                timeout(Duration::from_secs(2), queue.pop())
                    .await
                    .unwrap()
                    .unwrap();
            }

            hub.remove(id, RemovalReason::ClientClosed).await.unwrap();
            // Drain until the hub has applied the removal.
            while timeout(Duration::from_secs(2), queue.pop())
                .await
                .unwrap()
                .is_some()
            {}

            assert!(queue.is_closed());
            for _ in 0..20 {
                tokio::task::yield_now().await;
                assert!(queue.try_pop().is_none());
            }
        }));
    }

    for subscriber in subscribers {
        subscriber.await.unwrap();
    }

    let stats = hub.stats();
    assert_eq!(stats.subscribers, 0);
    assert_eq!(stats.subscribers_removed, 32);

    cancel.cancel();
    publisher.await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn racing_removals_retire_once() {
    let (hub, _cancel, _task) = spawn_hub(BroadcastConfig::default());

    let queue = hub.new_queue();
    let id = hub.register(Arc::clone(&queue)).await.unwrap();

    let (a, b) = tokio::join!(
        hub.remove(id, RemovalReason::ReadFailed),
        hub.remove(id, RemovalReason::WriteDeadline),
    );
    a.unwrap();
    b.unwrap();

    assert!(timeout(Duration::from_secs(1), queue.pop()).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = hub.stats();
    assert_eq!(stats.subscribers_removed, 1);
    assert_eq!(stats.subscribers, 0);
}

#[tokio::test]
async fn stalled_subscriber_does_not_hold_back_others() {
    let (hub, _cancel, _task) = spawn_hub(BroadcastConfig::default());

    let stalled = hub.new_queue();
    hub.register(Arc::clone(&stalled)).await.unwrap();
    let fast_a = hub.new_queue();
    hub.register(Arc::clone(&fast_a)).await.unwrap();
    let fast_b = hub.new_queue();
    hub.register(Arc::clone(&fast_b)).await.unwrap();

    for value in 1..=10 {
        hub.publish(price("black_wool", value)).await.unwrap();
        for queue in [&fast_a, &fast_b] {
            let event = timeout(Duration::from_secs(1), queue.pop())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.value, Decimal::new(value, 0));
        }
    }

    // A later acknowledged registration means the last fan-out pass finished.
    hub.register(hub.new_queue()).await.unwrap();

    // The stalled queue holds only the newest event.
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled.try_pop().unwrap().value, Decimal::new(10, 0));
    assert_eq!(hub.stats().events_replaced, 9);
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (hub, _cancel, _task) = spawn_hub(BroadcastConfig {
        queue_capacity: 64,
        ..BroadcastConfig::default()
    });

    let queue = hub.new_queue();
    hub.register(Arc::clone(&queue)).await.unwrap();

    let ingress = hub.ingress();
    for value in 1..=50 {
        let asset = if value % 2 == 0 { "white_wool" } else { "black_wool" };
        ingress.send(price(asset, value)).await.unwrap();
    }

    for value in 1..=50 {
        let event = timeout(Duration::from_secs(1), queue.pop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.value, Decimal::new(value, 0));
    }
}

#[tokio::test]
async fn shutdown_closes_queues_and_rejects_new_work() {
    let (hub, cancel, task) = spawn_hub(BroadcastConfig::default());

    let queues: Vec<_> = (0..3).map(|_| hub.new_queue()).collect();
    for queue in &queues {
        hub.register(Arc::clone(queue)).await.unwrap();
    }

    cancel.cancel();
    task.await.unwrap();

    for queue in &queues {
        assert!(queue.is_closed());
        assert!(queue.pop().await.is_none());
    }
    assert!(!hub.stats().running);
    assert_eq!(
        hub.register(hub.new_queue()).await.unwrap_err(),
        HubError::Closed
    );
    assert_eq!(
        hub.publish(price("white_wool", 1)).await.unwrap_err(),
        HubError::Closed
    );
}
