//! Restore registry: at most one running session per source.
//!
//! The registry map is the only structure in the restore path that needs
//! synchronized mutation. Every change to a slot goes through
//! `compare_and_set`, so two callers racing to start a restore for the same
//! source can never both start a worker.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::session::{RestoreBounds, RestoreProgress, RestoreSession};
use super::Result;
use crate::config::RestoreConfig;
use crate::pool::LogPool;
use crate::saga::SagaExecutor;

/// Process-wide table of restore sessions keyed by source.
pub struct RestoreRegistry {
    pool: Arc<LogPool>,
    executor: Arc<dyn SagaExecutor>,
    config: RestoreConfig,
    sessions: Mutex<HashMap<String, Arc<RestoreSession>>>,
}

impl RestoreRegistry {
    pub fn new(pool: Arc<LogPool>, executor: Arc<dyn SagaExecutor>, config: RestoreConfig) -> Self {
        Self {
            pool,
            executor,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<LogPool> {
        &self.pool
    }

    /// Start a restore for `source`, or return the one already running.
    ///
    /// - No session yet: a new one is installed and started.
    /// - A session is running: it is returned unchanged and `bounds` is ignored.
    /// - The last session is done: it is replaced by a new one, unless another
    ///   caller replaced it first, in which case that caller's session is
    ///   returned, finished or not.
    #[tracing::instrument(name = "restore.start", skip_all, fields(source = %source))]
    pub async fn start_or_get(
        &self,
        source: &str,
        bounds: RestoreBounds,
    ) -> Result<Arc<RestoreSession>> {
        let source = self.pool.source_or_default(Some(source)).to_string();

        loop {
            let observed = self.get(&source).await;
            if let Some(existing) = &observed {
                if !existing.is_done() {
                    debug!(execution_id = %existing.execution_id(), "Restore already running");
                    return Ok(existing.clone());
                }
            }

            let candidate = Arc::new(RestoreSession::create(&source, bounds, &self.pool).await?);

            match self
                .compare_and_set(&source, observed.as_ref(), candidate.clone())
                .await
            {
                Ok(()) => {
                    info!(
                        execution_id = %candidate.execution_id(),
                        replaced = observed.is_some(),
                        "Restore session installed"
                    );
                    candidate
                        .start(&self.pool, self.executor.clone(), &self.config)
                        .await?;
                    return Ok(candidate);
                }
                // Returned even if it has already finished.
                Err(Some(current)) => {
                    debug!(
                        execution_id = %current.execution_id(),
                        done = current.is_done(),
                        "Lost start race, returning session installed concurrently"
                    );
                    return Ok(current);
                }
                // The slot was emptied under us; try again.
                Err(None) => continue,
            }
        }
    }

    /// Current session for a source, running or finished.
    pub async fn get(&self, source: &str) -> Option<Arc<RestoreSession>> {
        let source = self.pool.source_or_default(Some(source));
        self.sessions.lock().await.get(source).cloned()
    }

    /// Progress of the current session, or `None` if no restore has ever run for the source.
    pub async fn status(&self, source: &str) -> Option<RestoreProgress> {
        self.get(source).await.map(|s| s.progress())
    }

    /// Ask the current session to stop and return its progress.
    pub async fn stop(&self, source: &str) -> Option<RestoreProgress> {
        let session = self.get(source).await?;
        session.stop();
        Some(session.progress())
    }

    /// Progress of every known session, ordered by source.
    pub async fn list(&self) -> Vec<RestoreProgress> {
        let sessions: Vec<Arc<RestoreSession>> =
            self.sessions.lock().await.values().cloned().collect();
        let mut progress: Vec<RestoreProgress> = sessions.iter().map(|s| s.progress()).collect();
        progress.sort_by(|a, b| a.source.cmp(&b.source));
        progress
    }

    /// Install `replacement` if the slot still holds `expected`.
    ///
    /// `expected == None` means "only if the slot is empty". On a mismatch the
    /// slot is left untouched and its current occupant is returned.
    async fn compare_and_set(
        &self,
        source: &str,
        expected: Option<&Arc<RestoreSession>>,
        replacement: Arc<RestoreSession>,
    ) -> std::result::Result<(), Option<Arc<RestoreSession>>> {
        let mut sessions = self.sessions.lock().await;
        let current = sessions.get(source);
        let unchanged = match (current, expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => Arc::ptr_eq(current, expected),
            _ => false,
        };
        if !unchanged {
            return Err(current.cloned());
        }
        sessions.insert(source.to_string(), replacement);
        Ok(())
    }
}
