//! Logging saga executor.
//!
//! Stands in for the saga engine in standalone mode: every submission is
//! logged and reported as successful.

use async_trait::async_trait;
use tracing::info;
use ulid::Ulid;

use super::{Result, SagaExecutor, SagaHandoff};
use crate::operation::{OperationInput, SagaName};

#[derive(Debug, Default)]
pub struct LoggingExecutor;

impl LoggingExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SagaExecutor for LoggingExecutor {
    async fn execute(&self, saga: SagaName, input: OperationInput) -> Result<SagaHandoff> {
        let execution_id = Ulid::new().to_string();
        info!(
            saga = %saga,
            execution_id = %execution_id,
            tx_id = %input.tx_id,
            method = %input.method,
            resource = %input.resource(),
            version = %input.version.to_rfc3339(),
            has_body = input.body.is_some(),
            "Saga executed"
        );
        Ok(SagaHandoff::succeeded(execution_id))
    }
}
