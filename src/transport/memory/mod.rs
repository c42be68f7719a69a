//! In-memory log transport for standalone mode and testing.
//!
//! Each topic is a vector of messages guarded by a tokio `RwLock`. Consumers
//! wait for appends on a `watch` channel carrying the topic length, so a
//! blocked `receive` wakes as soon as a message lands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{
    LogConsumer, LogMessage, LogProducer, LogTransport, Result, StartPosition, TransportError,
};

struct MemoryTopic {
    name: String,
    messages: RwLock<Vec<LogMessage>>,
    appended: watch::Sender<usize>,
}

impl MemoryTopic {
    fn new(name: &str) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            messages: RwLock::new(Vec::new()),
            appended,
        }
    }
}

/// In-memory log transport.
#[derive(Default)]
pub struct MemoryLogTransport {
    topics: RwLock<HashMap<String, Arc<MemoryTopic>>>,
    fail_on_producer: RwLock<bool>,
    fail_on_consumer: RwLock<bool>,
    fail_on_publish: Arc<RwLock<bool>>,
    producers_created: AtomicUsize,
}

impl MemoryLogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_producer(&self, fail: bool) {
        *self.fail_on_producer.write().await = fail;
    }

    pub async fn set_fail_on_consumer(&self, fail: bool) {
        *self.fail_on_consumer.write().await = fail;
    }

    /// Make every publish, including through existing producers, fail.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    /// Number of producer handles handed out so far.
    pub fn producers_created(&self) -> usize {
        self.producers_created.load(Ordering::SeqCst)
    }

    /// Snapshot of every message on a topic, in id order.
    pub async fn messages(&self, topic: &str) -> Vec<LogMessage> {
        let topics = self.topics.read().await;
        match topics.get(topic) {
            Some(t) => t.messages.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Names of all topics that have been opened.
    pub async fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn topic(&self, name: &str) -> Arc<MemoryTopic> {
        if let Some(topic) = self.topics.read().await.get(name) {
            return topic.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = %name, "Created in-memory topic");
                Arc::new(MemoryTopic::new(name))
            })
            .clone()
    }
}

#[async_trait]
impl LogTransport for MemoryLogTransport {
    async fn producer(&self, topic: &str) -> Result<Arc<dyn LogProducer>> {
        if *self.fail_on_producer.read().await {
            return Err(TransportError::Connection(format!(
                "Mock producer failure for topic '{}'",
                topic
            )));
        }
        let topic = self.topic(topic).await;
        self.producers_created.fetch_add(1, Ordering::SeqCst);
        info!(topic = %topic.name, "In-memory producer opened");
        Ok(Arc::new(MemoryLogProducer {
            topic,
            fail_on_publish: self.fail_on_publish.clone(),
        }))
    }

    async fn consumer(
        &self,
        topic: &str,
        start: Option<StartPosition>,
    ) -> Result<Box<dyn LogConsumer>> {
        if *self.fail_on_consumer.read().await {
            return Err(TransportError::Connection(format!(
                "Mock consumer failure for topic '{}'",
                topic
            )));
        }
        let topic = self.topic(topic).await;
        let appended = topic.appended.subscribe();
        Ok(Box::new(MemoryLogConsumer {
            topic,
            cursor: 0,
            start,
            appended,
        }))
    }

    async fn last_message(&self, topic: &str) -> Result<Option<LogMessage>> {
        let topics = self.topics.read().await;
        match topics.get(topic) {
            Some(t) => Ok(t.messages.read().await.last().cloned()),
            None => Ok(None),
        }
    }
}

/// Producer over an in-memory topic.
pub struct MemoryLogProducer {
    topic: Arc<MemoryTopic>,
    fail_on_publish: Arc<RwLock<bool>>,
}

#[async_trait]
impl LogProducer for MemoryLogProducer {
    fn topic(&self) -> &str {
        &self.topic.name
    }

    async fn publish(&self, message: LogMessage) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(TransportError::Publish {
                topic: self.topic.name.clone(),
                message: "Mock publish failure".to_string(),
            });
        }

        let len = {
            let mut messages = self.topic.messages.write().await;
            if let Some(last) = messages.last() {
                if message.id <= last.id {
                    return Err(TransportError::OutOfOrder {
                        topic: self.topic.name.clone(),
                        id: message.id,
                        last: last.id,
                    });
                }
            }
            debug!(
                topic = %self.topic.name,
                id = %message.id,
                position = %message.position,
                "Appended message"
            );
            messages.push(message);
            messages.len()
        };

        self.topic.appended.send_replace(len);
        Ok(())
    }
}

/// Consumer over an in-memory topic.
pub struct MemoryLogConsumer {
    topic: Arc<MemoryTopic>,
    cursor: usize,
    /// Start bound still to be applied. Cleared once the first admitted message is found.
    start: Option<StartPosition>,
    appended: watch::Receiver<usize>,
}

impl MemoryLogConsumer {
    async fn next_available(&mut self) -> Option<LogMessage> {
        // Mark the current length as seen before looking, so an append racing
        // with this check still wakes the next `changed()`.
        let _ = self.appended.borrow_and_update();

        let messages = self.topic.messages.read().await;
        if let Some(start) = self.start {
            while let Some(message) = messages.get(self.cursor) {
                if start.admits(message.id) {
                    self.start = None;
                    break;
                }
                self.cursor += 1;
            }
        }
        if self.start.is_some() {
            return None;
        }

        let message = messages.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(message)
    }
}

#[async_trait]
impl LogConsumer for MemoryLogConsumer {
    fn topic(&self) -> &str {
        &self.topic.name
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<LogMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.next_available().await {
                return Ok(Some(message));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match tokio::time::timeout(remaining, self.appended.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(TransportError::Closed(self.topic.name.clone())),
                Err(_) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests;
