//! Transaction log and restore configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default source name when a writer does not supply one.
pub const DEFAULT_SOURCE: &str = "default";
/// Default prefix for log topic names.
pub const DEFAULT_TOPIC_PREFIX: &str = "tx-";
/// Default restore poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Transaction log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TxLogConfig {
    /// Source used when a write carries none.
    pub default_source: String,
    /// Prefix prepended to every topic name.
    pub topic_prefix: String,
    /// `true`: one topic per source. `false`: every source shares the default source's topic.
    pub topic_per_source: bool,
}

impl Default for TxLogConfig {
    fn default() -> Self {
        Self {
            default_source: DEFAULT_SOURCE.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            topic_per_source: true,
        }
    }
}

/// What replay does with an entry whose method it does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedMethodPolicy {
    /// Count the entry as ignored and continue.
    #[default]
    Ignore,
    /// Count the entry as ignored and end the session with an error.
    Abort,
}

/// Restore session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Upper bound on one blocking receive; also the worst-case stop latency.
    pub poll_interval_ms: u64,
    pub unrecognized_method: UnrecognizedMethodPolicy,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            unrecognized_method: UnrecognizedMethodPolicy::Ignore,
        }
    }
}

impl RestoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
