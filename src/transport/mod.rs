//! Log transport interface.
//!
//! The transport is the durable, ordered, multi-consumer append log the
//! transaction log is written to. This module contains:
//! - `LogTransport` trait: producer/consumer handles over named topics
//! - `LogProducer` / `LogConsumer` traits
//! - `LogMessage`: one entry, addressed by id, carrying named parts
//! - Implementations: in-memory

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::id::TxId;

pub mod memory;

pub use memory::MemoryLogTransport;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur talking to the log transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish to topic '{topic}' failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Message {id} on topic '{topic}' is not after last id {last}")]
    OutOfOrder { topic: String, id: TxId, last: TxId },

    #[error("Topic '{0}' is closed")]
    Closed(String),
}

/// One log entry as stored by the transport.
///
/// Parts are independently addressable, so a reader can fetch a small
/// metadata part without materializing a large payload part.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    /// Ordering key, unique and monotonic within a topic.
    pub id: TxId,
    /// Operator-facing position string. Not used for ordering.
    pub position: String,
    parts: BTreeMap<String, Bytes>,
}

impl LogMessage {
    pub fn new(id: TxId, position: impl Into<String>) -> Self {
        Self {
            id,
            position: position.into(),
            parts: BTreeMap::new(),
        }
    }

    pub fn with_part(mut self, name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.parts.insert(name.into(), content.into());
        self
    }

    pub fn part(&self, name: &str) -> Option<&Bytes> {
        self.parts.get(name)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }
}

/// Where a consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPosition {
    pub id: TxId,
    pub inclusive: bool,
}

impl StartPosition {
    pub fn inclusive(id: TxId) -> Self {
        Self {
            id,
            inclusive: true,
        }
    }

    pub fn exclusive(id: TxId) -> Self {
        Self {
            id,
            inclusive: false,
        }
    }

    /// Whether a message with `id` lies at or after this start.
    pub fn admits(&self, id: TxId) -> bool {
        if self.inclusive {
            id >= self.id
        } else {
            id > self.id
        }
    }
}

/// Writes messages to one topic.
///
/// A producer is shared by every writer of its topic and must be safe for
/// concurrent use.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Topic this producer appends to.
    fn topic(&self) -> &str;

    /// Append a message. Returns once the transport acknowledges durability.
    async fn publish(&self, message: LogMessage) -> Result<()>;
}

/// Reads messages from one topic in id order.
#[async_trait]
pub trait LogConsumer: Send {
    /// Topic this consumer reads.
    fn topic(&self) -> &str;

    /// Next message, waiting at most `timeout`. `None` when nothing arrived.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<LogMessage>>;
}

/// Interface to the durable log.
///
/// Implementations:
/// - `MemoryLogTransport`: In-process topics for tests and standalone mode
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Create a producer for a topic.
    async fn producer(&self, topic: &str) -> Result<Arc<dyn LogProducer>>;

    /// Create a consumer for a topic. `None` starts at the earliest retained message.
    async fn consumer(
        &self,
        topic: &str,
        start: Option<StartPosition>,
    ) -> Result<Box<dyn LogConsumer>>;

    /// Newest message on a topic, or `None` for an empty or unknown topic.
    async fn last_message(&self, topic: &str) -> Result<Option<LogMessage>>;
}
