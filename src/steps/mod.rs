//! Saga steps that write the transaction log.
//!
//! The saga engine invokes these after the backend writes of a live
//! create/overwrite or delete. A step returns only once the log transport has
//! acknowledged the append. Any failure aborts the saga: the log must contain
//! every accepted mutation, or a later restore would silently miss it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::codec::{self, CodecError};
use crate::id::TxId;
use crate::operation::{Method, OperationInput};
use crate::pool::LogPool;
use crate::transport::TransportError;

/// Errors from a saga step. Every variant aborts the enclosing saga.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Step '{step}' aborted: transaction log append failed")]
    AppendFailed {
        step: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Step '{step}' aborted: entry could not be encoded")]
    EncodeFailed {
        step: &'static str,
        #[source]
        source: CodecError,
    },
}

/// Input handed to a step by the saga engine.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Source that originated the write. `None` uses the configured default.
    pub source: Option<String>,
    pub input: OperationInput,
}

/// Where an entry landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub topic: String,
    pub id: TxId,
    pub position: String,
}

/// One node of a saga graph.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, context: &StepContext) -> Result<Appended, StepError>;
}

/// Appends a `PUT` entry for the current operation.
pub struct AppendOnPut {
    pool: Arc<LogPool>,
}

impl AppendOnPut {
    pub const NAME: &'static str = "txlog-append-put";

    pub fn new(pool: Arc<LogPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SagaStep for AppendOnPut {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, context: &StepContext) -> Result<Appended, StepError> {
        append(&self.pool, Self::NAME, context, Method::Put).await
    }
}

/// Appends a `DELETE` entry for the current operation.
pub struct AppendOnDelete {
    pool: Arc<LogPool>,
}

impl AppendOnDelete {
    pub const NAME: &'static str = "txlog-append-delete";

    pub fn new(pool: Arc<LogPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SagaStep for AppendOnDelete {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, context: &StepContext) -> Result<Appended, StepError> {
        append(&self.pool, Self::NAME, context, Method::Delete).await
    }
}

#[tracing::instrument(name = "txlog.append", skip_all, fields(step = step, tx_id = %context.input.tx_id))]
async fn append(
    pool: &LogPool,
    step: &'static str,
    context: &StepContext,
    method: Method,
) -> Result<Appended, StepError> {
    let source = pool.source_or_default(context.source.as_deref());
    let mut input = context.input.with_method(method);
    if input.method == Method::Delete {
        input.body = None;
    }

    let message =
        codec::encode(&input).map_err(|source| StepError::EncodeFailed { step, source })?;
    let id = message.id;
    let position = message.position.clone();

    let producer = pool.producer(source).await.map_err(|e| {
        error!(source = %source, error = %e, "No transaction log producer");
        StepError::AppendFailed { step, source: e }
    })?;
    producer.publish(message).await.map_err(|e| {
        error!(source = %source, error = %e, "Transaction log append failed");
        StepError::AppendFailed { step, source: e }
    })?;

    debug!(source = %source, topic = %producer.topic(), position = %position, "Appended to transaction log");
    Ok(Appended {
        topic: producer.topic().to_string(),
        id,
        position,
    })
}
