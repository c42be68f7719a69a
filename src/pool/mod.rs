//! Transaction log pool.
//!
//! Resolves a logical source to its physical topic and hands out one shared
//! producer per topic. The partitioning policy comes from `TxLogConfig` and is
//! fixed for the lifetime of the pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::TxLogConfig;
use crate::transport::{LogConsumer, LogMessage, LogProducer, LogTransport, Result, StartPosition};

/// Per-source view over a log transport.
pub struct LogPool {
    transport: Arc<dyn LogTransport>,
    config: TxLogConfig,
    producers: RwLock<HashMap<String, Arc<dyn LogProducer>>>,
}

impl LogPool {
    pub fn new(transport: Arc<dyn LogTransport>, config: TxLogConfig) -> Self {
        info!(
            default_source = %config.default_source,
            topic_prefix = %config.topic_prefix,
            topic_per_source = config.topic_per_source,
            "Transaction log pool initialized"
        );
        Self {
            transport,
            config,
            producers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TxLogConfig {
        &self.config
    }

    /// Source to use for a write or restore that may not name one.
    pub fn source_or_default<'a>(&'a self, source: Option<&'a str>) -> &'a str {
        match source {
            Some(s) if !s.is_empty() => s,
            _ => self.config.default_source.as_str(),
        }
    }

    /// Topic holding the log for a source.
    pub fn topic_of(&self, source: &str) -> String {
        let source = if self.config.topic_per_source {
            self.source_or_default(Some(source))
        } else {
            self.config.default_source.as_str()
        };
        format!("{}{}", self.config.topic_prefix, source)
    }

    /// Shared producer for a source's topic, created on first use.
    ///
    /// Sources that map to the same topic share one producer.
    pub async fn producer(&self, source: &str) -> Result<Arc<dyn LogProducer>> {
        let topic = self.topic_of(source);

        if let Some(producer) = self.producers.read().await.get(&topic) {
            return Ok(producer.clone());
        }

        // Creation happens under the write lock so racing callers cannot
        // each open their own producer.
        let mut producers = self.producers.write().await;
        if let Some(producer) = producers.get(&topic) {
            return Ok(producer.clone());
        }
        let producer = self.transport.producer(&topic).await?;
        debug!(source = %source, topic = %topic, "Created transaction log producer");
        producers.insert(topic, producer.clone());
        Ok(producer)
    }

    /// Consumer over a source's topic.
    pub async fn consumer(
        &self,
        source: &str,
        start: Option<StartPosition>,
    ) -> Result<Box<dyn LogConsumer>> {
        let topic = self.topic_of(source);
        debug!(source = %source, topic = %topic, start = ?start, "Opening transaction log consumer");
        self.transport.consumer(&topic, start).await
    }

    /// Newest entry on a source's topic, or `None` when the log is empty.
    pub async fn newest_entry(&self, source: &str) -> Result<Option<LogMessage>> {
        self.transport.last_message(&self.topic_of(source)).await
    }
}

#[cfg(test)]
mod tests;
