use std::time::Duration;

use super::*;
use crate::id::{TxId, TxIdGenerator};

fn message(id: TxId) -> LogMessage {
    LogMessage::new(id, format!("doc/{}", id)).with_part("meta", "{}")
}

async fn publish_n(transport: &MemoryLogTransport, topic: &str, n: usize) -> Vec<TxId> {
    let generator = TxIdGenerator::new();
    let producer = transport.producer(topic).await.unwrap();
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let id = generator.next_id();
        producer.publish(message(id)).await.unwrap();
        ids.push(id);
    }
    ids
}

async fn drain(consumer: &mut Box<dyn LogConsumer>) -> Vec<TxId> {
    let mut ids = Vec::new();
    while let Some(m) = consumer
        .receive(Duration::from_millis(20))
        .await
        .unwrap()
    {
        ids.push(m.id);
    }
    ids
}

#[tokio::test]
async fn test_last_message_of_unknown_topic_is_none() {
    let transport = MemoryLogTransport::new();
    assert!(transport.last_message("tx-nothing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_last_message_is_newest() {
    let transport = MemoryLogTransport::new();
    let ids = publish_n(&transport, "tx-a", 3).await;
    let last = transport.last_message("tx-a").await.unwrap().unwrap();
    assert_eq!(last.id, ids[2]);
}

#[tokio::test]
async fn test_consumer_from_beginning_reads_in_order() {
    let transport = MemoryLogTransport::new();
    let ids = publish_n(&transport, "tx-a", 5).await;

    let mut consumer = transport.consumer("tx-a", None).await.unwrap();
    assert_eq!(drain(&mut consumer).await, ids);
}

#[tokio::test]
async fn test_consumer_start_inclusive_and_exclusive() {
    let transport = MemoryLogTransport::new();
    let ids = publish_n(&transport, "tx-a", 5).await;

    let mut inclusive = transport
        .consumer("tx-a", Some(StartPosition::inclusive(ids[2])))
        .await
        .unwrap();
    assert_eq!(drain(&mut inclusive).await, ids[2..].to_vec());

    let mut exclusive = transport
        .consumer("tx-a", Some(StartPosition::exclusive(ids[2])))
        .await
        .unwrap();
    assert_eq!(drain(&mut exclusive).await, ids[3..].to_vec());
}

#[tokio::test]
async fn test_receive_times_out_on_idle_topic() {
    let transport = MemoryLogTransport::new();
    let mut consumer = transport.consumer("tx-idle", None).await.unwrap();

    let started = tokio::time::Instant::now();
    let received = consumer.receive(Duration::from_millis(50)).await.unwrap();
    assert!(received.is_none());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_blocked_receive_wakes_on_append() {
    let transport = Arc::new(MemoryLogTransport::new());
    let mut consumer = transport.consumer("tx-a", None).await.unwrap();

    let publisher = transport.clone();
    let id = TxIdGenerator::new().next_id();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let producer = publisher.producer("tx-a").await.unwrap();
        producer.publish(message(id)).await.unwrap();
    });

    let received = consumer.receive(Duration::from_secs(5)).await.unwrap();
    assert_eq!(received.map(|m| m.id), Some(id));
}

#[tokio::test]
async fn test_start_bound_applies_to_later_appends() {
    let transport = MemoryLogTransport::new();
    let generator = TxIdGenerator::new();
    let before = generator.next_id();
    let bound = generator.next_id();
    let after = generator.next_id();

    let mut consumer = transport
        .consumer("tx-a", Some(StartPosition::exclusive(bound)))
        .await
        .unwrap();

    let producer = transport.producer("tx-a").await.unwrap();
    producer.publish(message(before)).await.unwrap();
    producer.publish(message(bound)).await.unwrap();
    producer.publish(message(after)).await.unwrap();

    assert_eq!(drain(&mut consumer).await, vec![after]);
}

#[tokio::test]
async fn test_publish_rejects_out_of_order_id() {
    let transport = MemoryLogTransport::new();
    let generator = TxIdGenerator::new();
    let first = generator.next_id();
    let second = generator.next_id();

    let producer = transport.producer("tx-a").await.unwrap();
    producer.publish(message(second)).await.unwrap();
    let result = producer.publish(message(first)).await;
    assert!(matches!(result, Err(TransportError::OutOfOrder { .. })));
    assert_eq!(transport.messages("tx-a").await.len(), 1);
}

#[tokio::test]
async fn test_fail_on_publish_affects_existing_producers() {
    let transport = MemoryLogTransport::new();
    let producer = transport.producer("tx-a").await.unwrap();

    transport.set_fail_on_publish(true).await;
    let result = producer
        .publish(message(TxIdGenerator::new().next_id()))
        .await;
    assert!(matches!(result, Err(TransportError::Publish { .. })));
}

#[tokio::test]
async fn test_fail_on_producer_and_consumer() {
    let transport = MemoryLogTransport::new();
    transport.set_fail_on_producer(true).await;
    transport.set_fail_on_consumer(true).await;

    assert!(transport.producer("tx-a").await.is_err());
    assert!(transport.consumer("tx-a", None).await.is_err());
    assert_eq!(transport.producers_created(), 0);
}

#[test]
fn test_message_parts_are_independent() {
    let id = TxIdGenerator::new().next_id();
    let m = LogMessage::new(id, "p")
        .with_part("meta", "{\"a\":1}")
        .with_part("data", "{}");
    assert!(m.has_part("meta"));
    assert!(m.has_part("data"));
    assert!(!m.has_part("other"));
    assert_eq!(m.part_names().collect::<Vec<_>>(), vec!["data", "meta"]);
}
