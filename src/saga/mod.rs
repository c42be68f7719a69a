//! Saga engine boundary.
//!
//! The saga engine runs the named write graphs (document storage, search
//! index, notifications, and for live writes the log-append step). The core
//! only submits an operation and waits for the handoff result.

use async_trait::async_trait;

use crate::operation::{OperationInput, SagaName};

pub mod logging;
pub mod mock;

pub use logging::LoggingExecutor;
pub use mock::RecordingExecutor;

/// Result type for saga submissions.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors submitting to the saga engine.
///
/// A saga that ran and failed is not an error here; it is a handoff with
/// `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Saga engine unavailable: {0}")]
    Unavailable(String),

    #[error("Saga '{saga}' could not be submitted: {message}")]
    Rejected { saga: SagaName, message: String },
}

/// Outcome of one saga execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaHandoff {
    pub execution_id: String,
    pub success: bool,
    pub failure_cause: Option<String>,
}

impl SagaHandoff {
    pub fn succeeded(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            success: true,
            failure_cause: None,
        }
    }

    pub fn failed(execution_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            success: false,
            failure_cause: Some(cause.into()),
        }
    }
}

/// Interface to the saga engine.
///
/// Implementations:
/// - `LoggingExecutor`: logs each submission and succeeds (standalone mode)
/// - `RecordingExecutor`: records submissions, with failure and gating controls for tests
#[async_trait]
pub trait SagaExecutor: Send + Sync {
    /// Run a saga and wait for it to complete.
    async fn execute(&self, saga: SagaName, input: OperationInput) -> Result<SagaHandoff>;
}
