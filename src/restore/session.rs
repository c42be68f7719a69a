//! Restore session: one replay pass over one source's log.
//!
//! Lifecycle is `CREATED -> RUNNING -> DONE` and never goes back. The
//! session's worker task is the only writer of its counters and flags; every
//! other caller reads them through `progress()`.
//!
//! The ceiling is the newest entry id at creation. Entries appended while the
//! session runs lie past it and are left for a later session, which gives
//! every session a fixed end point.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use super::{RestoreError, Result};
use crate::codec;
use crate::config::{RestoreConfig, UnrecognizedMethodPolicy};
use crate::id::TxId;
use crate::operation::SagaName;
use crate::pool::LogPool;
use crate::saga::SagaExecutor;
use crate::transport::{LogConsumer, LogMessage, StartPosition};

/// Range of entries a session replays. Absent bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreBounds {
    pub from: Option<TxId>,
    pub from_inclusive: bool,
    pub to: Option<TxId>,
    pub to_inclusive: bool,
}

impl Default for RestoreBounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RestoreBounds {
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            from_inclusive: true,
            to: None,
            to_inclusive: true,
        }
    }

    pub fn start_position(&self) -> Option<StartPosition> {
        self.from.map(|id| StartPosition {
            id,
            inclusive: self.from_inclusive,
        })
    }

    /// Whether `id` lies beyond the `to` bound.
    pub fn is_past_end(&self, id: TxId) -> bool {
        match self.to {
            Some(to) if self.to_inclusive => id > to,
            Some(to) => id >= to,
            None => false,
        }
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    ReachedCeiling,
    ReachedEnd,
    Stopped,
}

/// Point-in-time view of a session, safe to hand to outer layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreProgress {
    pub source: String,
    pub execution_id: String,
    pub from_id: Option<String>,
    pub from_inclusive: bool,
    pub to_id: Option<String>,
    pub to_inclusive: bool,
    pub ceiling_id: Option<String>,
    pub messages_restored: u64,
    pub messages_failed: u64,
    pub messages_ignored: u64,
    pub started: bool,
    pub stopped: bool,
    pub done: bool,
    pub worker_alive: bool,
    pub error: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

/// One replay pass over one source's transaction log.
pub struct RestoreSession {
    source: String,
    execution_id: String,
    bounds: RestoreBounds,
    ceiling: Option<TxId>,
    created_at: DateTime<Utc>,

    restored: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,

    started: AtomicBool,
    stopped: AtomicBool,
    done: AtomicBool,
    error: OnceLock<String>,
    finished_at: OnceLock<DateTime<Utc>>,

    stop_signal: Notify,
    finished: Notify,
    worker: OnceLock<JoinHandle<()>>,
}

impl RestoreSession {
    /// Create a session, capturing the source's newest entry as its ceiling.
    ///
    /// The session does nothing until `start` is called.
    pub async fn create(source: &str, bounds: RestoreBounds, pool: &LogPool) -> Result<Self> {
        let ceiling = pool.newest_entry(source).await?.map(|m| m.id);
        Ok(Self {
            source: source.to_string(),
            execution_id: Ulid::new().to_string(),
            bounds,
            ceiling,
            created_at: Utc::now(),
            restored: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            done: AtomicBool::new(false),
            error: OnceLock::new(),
            finished_at: OnceLock::new(),
            stop_signal: Notify::new(),
            finished: Notify::new(),
            worker: OnceLock::new(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn bounds(&self) -> RestoreBounds {
        self.bounds
    }

    pub fn ceiling(&self) -> Option<TxId> {
        self.ceiling
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn messages_restored(&self) -> u64 {
        self.restored.load(Ordering::SeqCst)
    }

    pub fn messages_failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn messages_ignored(&self) -> u64 {
        self.ignored.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.get().map(String::as_str)
    }

    pub fn is_worker_alive(&self) -> bool {
        self.worker
            .get()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start the worker. Only the first call does anything; later calls return `Ok(false)`.
    ///
    /// A consumer that cannot be opened is returned as an error, and the
    /// session is left `DONE` with the error recorded.
    pub async fn start(
        self: &Arc<Self>,
        pool: &LogPool,
        executor: Arc<dyn SagaExecutor>,
        config: &RestoreConfig,
    ) -> Result<bool> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        if self.nothing_to_replay() {
            info!(
                source = %self.source,
                execution_id = %self.execution_id,
                ceiling = ?self.ceiling.map(|c| c.to_string()),
                "Nothing to restore"
            );
            self.finish();
            return Ok(true);
        }

        let consumer = match pool.consumer(&self.source, self.bounds.start_position()).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(source = %self.source, error = %e, "Failed to open restore consumer");
                self.record_error(e.to_string());
                self.finish();
                return Err(e.into());
            }
        };

        let session = Arc::clone(self);
        let config = config.clone();
        let handle = tokio::spawn(async move {
            session.run(consumer, executor, config).await;
        });
        // Only the caller that flipped `started` reaches this point.
        let _ = self.worker.set(handle);
        Ok(true)
    }

    /// Ask the worker to stop. It exits within one poll interval.
    ///
    /// A session that is already `DONE` is left as it finished.
    pub fn stop(&self) {
        if self.is_done() {
            return;
        }
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(source = %self.source, execution_id = %self.execution_id, "Restore stop requested");
        }
        self.stop_signal.notify_one();
    }

    /// Wait until the session is `DONE`. Returns immediately if it was never started.
    pub async fn wait(&self) {
        loop {
            let finished = self.finished.notified();
            if !self.is_started() || self.is_done() {
                return;
            }
            finished.await;
        }
    }

    pub fn progress(&self) -> RestoreProgress {
        RestoreProgress {
            source: self.source.clone(),
            execution_id: self.execution_id.clone(),
            from_id: self.bounds.from.map(|id| id.to_string()),
            from_inclusive: self.bounds.from_inclusive,
            to_id: self.bounds.to.map(|id| id.to_string()),
            to_inclusive: self.bounds.to_inclusive,
            ceiling_id: self.ceiling.map(|id| id.to_string()),
            messages_restored: self.messages_restored(),
            messages_failed: self.messages_failed(),
            messages_ignored: self.messages_ignored(),
            started: self.is_started(),
            stopped: self.is_stopped(),
            done: self.is_done(),
            worker_alive: self.is_worker_alive(),
            error: self.error.get().cloned(),
            created_at: self.created_at.to_rfc3339(),
            finished_at: self.finished_at.get().map(|t| t.to_rfc3339()),
        }
    }

    fn nothing_to_replay(&self) -> bool {
        match (self.ceiling, self.bounds.start_position()) {
            (None, _) => true,
            (Some(ceiling), Some(start)) => !start.admits(ceiling),
            (Some(_), None) => false,
        }
    }

    fn is_past_ceiling(&self, id: TxId) -> bool {
        match self.ceiling {
            Some(ceiling) => id > ceiling,
            None => true,
        }
    }

    fn record_error(&self, message: String) {
        let _ = self.error.set(message);
    }

    fn finish(&self) {
        let _ = self.finished_at.set(Utc::now());
        self.done.store(true, Ordering::SeqCst);
        self.finished.notify_waiters();
    }

    #[tracing::instrument(
        name = "restore.run",
        skip_all,
        fields(source = %self.source, execution_id = %self.execution_id)
    )]
    async fn run(
        self: Arc<Self>,
        mut consumer: Box<dyn LogConsumer>,
        executor: Arc<dyn SagaExecutor>,
        config: RestoreConfig,
    ) {
        info!(
            topic = %consumer.topic(),
            from = ?self.bounds.from.map(|id| id.to_string()),
            to = ?self.bounds.to.map(|id| id.to_string()),
            ceiling = ?self.ceiling.map(|id| id.to_string()),
            "Restore started"
        );

        match self.replay(consumer.as_mut(), executor.as_ref(), &config).await {
            Ok(finish) => info!(
                reason = ?finish,
                restored = self.messages_restored(),
                failed = self.messages_failed(),
                ignored = self.messages_ignored(),
                "Restore finished"
            ),
            Err(e) => {
                error!(
                    error = %e,
                    restored = self.messages_restored(),
                    failed = self.messages_failed(),
                    ignored = self.messages_ignored(),
                    "Restore aborted"
                );
                self.record_error(e.to_string());
            }
        }

        drop(consumer);
        self.finish();
    }

    async fn replay(
        &self,
        consumer: &mut dyn LogConsumer,
        executor: &dyn SagaExecutor,
        config: &RestoreConfig,
    ) -> Result<Finish> {
        let poll_interval = config.poll_interval();
        loop {
            if self.is_stopped() {
                return Ok(Finish::Stopped);
            }

            let received = tokio::select! {
                received = consumer.receive(poll_interval) => received?,
                _ = self.stop_signal.notified() => return Ok(Finish::Stopped),
            };
            let Some(message) = received else {
                continue;
            };

            if self.bounds.is_past_end(message.id) {
                return Ok(Finish::ReachedEnd);
            }
            if self.is_past_ceiling(message.id) {
                return Ok(Finish::ReachedCeiling);
            }

            self.replay_one(&message, executor, config).await?;

            if Some(message.id) == self.ceiling {
                return Ok(Finish::ReachedCeiling);
            }
        }
    }

    async fn replay_one(
        &self,
        message: &LogMessage,
        executor: &dyn SagaExecutor,
        config: &RestoreConfig,
    ) -> Result<()> {
        let input = codec::decode(message)?;

        let Some(saga) = SagaName::for_replay(&input.method) else {
            self.ignored.fetch_add(1, Ordering::SeqCst);
            warn!(
                tx_id = %message.id,
                position = %message.position,
                method = %input.method,
                "Ignoring entry with unrecognized method"
            );
            if config.unrecognized_method == UnrecognizedMethodPolicy::Abort {
                return Err(RestoreError::UnrecognizedMethod {
                    id: message.id,
                    method: input.method.to_string(),
                });
            }
            return Ok(());
        };

        let resource = input.resource();
        match executor.execute(saga, input).await {
            Ok(handoff) if handoff.success => {
                self.restored.fetch_add(1, Ordering::SeqCst);
                debug!(
                    tx_id = %message.id,
                    saga = %saga,
                    resource = %resource,
                    saga_execution_id = %handoff.execution_id,
                    "Replayed entry"
                );
            }
            Ok(handoff) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    tx_id = %message.id,
                    saga = %saga,
                    resource = %resource,
                    saga_execution_id = %handoff.execution_id,
                    cause = handoff.failure_cause.as_deref().unwrap_or("unknown"),
                    "Replay of entry failed"
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    tx_id = %message.id,
                    saga = %saga,
                    resource = %resource,
                    error = %e,
                    "Replay of entry could not be submitted"
                );
            }
        }
        Ok(())
    }
}
