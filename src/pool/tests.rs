use std::time::Duration;

use super::*;
use crate::id::TxIdGenerator;
use crate::transport::MemoryLogTransport;

fn pool_with(transport: Arc<MemoryLogTransport>, topic_per_source: bool) -> LogPool {
    LogPool::new(
        transport,
        TxLogConfig {
            topic_per_source,
            ..TxLogConfig::default()
        },
    )
}

#[test]
fn test_topic_per_source() {
    let pool = pool_with(Arc::new(MemoryLogTransport::new()), true);
    assert_eq!(pool.topic_of("batch-import"), "tx-batch-import");
    assert_eq!(pool.topic_of("default"), "tx-default");
}

#[test]
fn test_topic_multiplexed() {
    let pool = pool_with(Arc::new(MemoryLogTransport::new()), false);
    assert_eq!(pool.topic_of("batch-import"), "tx-default");
    assert_eq!(pool.topic_of("other"), "tx-default");
}

#[test]
fn test_empty_source_maps_to_default() {
    let pool = pool_with(Arc::new(MemoryLogTransport::new()), true);
    assert_eq!(pool.topic_of(""), "tx-default");
    assert_eq!(pool.source_or_default(None), "default");
    assert_eq!(pool.source_or_default(Some("")), "default");
    assert_eq!(pool.source_or_default(Some("a")), "a");
}

#[tokio::test]
async fn test_producer_is_memoized_per_topic() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = pool_with(transport.clone(), true);

    let first = pool.producer("a").await.unwrap();
    let second = pool.producer("a").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    pool.producer("b").await.unwrap();
    assert_eq!(transport.producers_created(), 2);
}

#[tokio::test]
async fn test_multiplexed_sources_share_producer() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = pool_with(transport.clone(), false);

    let a = pool.producer("a").await.unwrap();
    let b = pool.producer("b").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.topic(), "tx-default");
    assert_eq!(transport.producers_created(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producer_requests_create_one_producer() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = Arc::new(pool_with(transport.clone(), true));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.producer("race").await.unwrap() })
        })
        .collect();

    let producers: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(transport.producers_created(), 1);
    assert!(producers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn test_producer_failure_is_propagated_and_not_cached() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = pool_with(transport.clone(), true);

    transport.set_fail_on_producer(true).await;
    assert!(pool.producer("a").await.is_err());

    transport.set_fail_on_producer(false).await;
    assert!(pool.producer("a").await.is_ok());
}

#[tokio::test]
async fn test_newest_entry() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = pool_with(transport, true);
    assert!(pool.newest_entry("a").await.unwrap().is_none());

    let generator = TxIdGenerator::new();
    let producer = pool.producer("a").await.unwrap();
    let first = generator.next_id();
    let second = generator.next_id();
    producer.publish(LogMessage::new(first, "e/1/0")).await.unwrap();
    producer.publish(LogMessage::new(second, "e/2/0")).await.unwrap();

    let newest = pool.newest_entry("a").await.unwrap().unwrap();
    assert_eq!(newest.id, second);
    assert!(pool.newest_entry("b").await.unwrap().is_none());
}

#[tokio::test]
async fn test_consumer_reads_source_topic() {
    let transport = Arc::new(MemoryLogTransport::new());
    let pool = pool_with(transport, true);

    let id = TxIdGenerator::new().next_id();
    pool.producer("a")
        .await
        .unwrap()
        .publish(LogMessage::new(id, "e/1/0"))
        .await
        .unwrap();

    let mut consumer = pool.consumer("a", None).await.unwrap();
    assert_eq!(consumer.topic(), "tx-a");
    let message = consumer.receive(Duration::from_millis(50)).await.unwrap();
    assert_eq!(message.map(|m| m.id), Some(id));
}
