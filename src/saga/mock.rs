//! Recording saga executor for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use super::{Result, SagaError, SagaExecutor, SagaHandoff};
use crate::operation::{OperationInput, SagaName};

/// Saga executor that records every submission.
///
/// Submissions for document ids marked with `fail_document` complete with a
/// failed handoff. `hold` parks every submission until `release` is called,
/// which keeps a restore session observably running.
pub struct RecordingExecutor {
    submissions: RwLock<Vec<(SagaName, OperationInput)>>,
    failing_documents: RwLock<HashSet<String>>,
    unavailable: RwLock<bool>,
    held: watch::Sender<bool>,
    entered: AtomicUsize,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            submissions: RwLock::new(Vec::new()),
            failing_documents: RwLock::new(HashSet::new()),
            unavailable: RwLock::new(false),
            held,
            entered: AtomicUsize::new(0),
        }
    }

    pub async fn fail_document(&self, id: impl Into<String>) {
        self.failing_documents.write().await.insert(id.into());
    }

    /// Make every submission return `SagaError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Number of submissions that have started, including held ones.
    pub fn entered_count(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub async fn submitted_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    pub async fn submissions(&self) -> Vec<(SagaName, OperationInput)> {
        self.submissions.read().await.clone()
    }

    async fn wait_until_released(&self) {
        let mut held = self.held.subscribe();
        while *held.borrow_and_update() {
            if held.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl SagaExecutor for RecordingExecutor {
    async fn execute(&self, saga: SagaName, input: OperationInput) -> Result<SagaHandoff> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.wait_until_released().await;

        if *self.unavailable.read().await {
            return Err(SagaError::Unavailable("Mock saga engine down".to_string()));
        }

        let execution_id = format!("exec-{}", input.tx_id);
        let fails = self.failing_documents.read().await.contains(&input.id);
        self.submissions.write().await.push((saga, input));

        if fails {
            Ok(SagaHandoff::failed(execution_id, "Mock document failure"))
        } else {
            Ok(SagaHandoff::succeeded(execution_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::id::TxIdGenerator;
    use crate::operation::Method;

    fn input(id: &str) -> OperationInput {
        OperationInput {
            tx_id: TxIdGenerator::new().next_id(),
            method: Method::Put,
            schema: "s".to_string(),
            namespace: "ns".to_string(),
            entity: "Thing".to_string(),
            id: id.to_string(),
            version: Utc::now().fixed_offset(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_records_submissions() {
        let executor = RecordingExecutor::new();
        let handoff = executor
            .execute(SagaName::CreateOrOverwriteNoTxLog, input("1"))
            .await
            .unwrap();
        assert!(handoff.success);
        assert_eq!(executor.submitted_count().await, 1);
    }

    #[tokio::test]
    async fn test_fail_document() {
        let executor = RecordingExecutor::new();
        executor.fail_document("bad").await;
        let handoff = executor
            .execute(SagaName::DeleteNoTxLog, input("bad"))
            .await
            .unwrap();
        assert!(!handoff.success);
        assert!(handoff.failure_cause.is_some());
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.hold();

        let running = executor.clone();
        let task = tokio::spawn(async move {
            running
                .execute(SagaName::CreateOrOverwriteNoTxLog, input("1"))
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(executor.entered_count(), 1);
        assert_eq!(executor.submitted_count().await, 0);

        executor.release();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(executor.submitted_count().await, 1);
    }
}
