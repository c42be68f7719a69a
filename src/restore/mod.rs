//! Restore: replay a source's transaction log through the saga engine.
//!
//! - `session`: one ordered replay pass with counters and cooperative stop
//! - `registry`: single-flight table of sessions keyed by source
//! - `control`: string-level start/status/stop surface for outer layers

mod control;
mod registry;
mod session;

pub use control::{RestoreControl, RestoreRequest};
pub use registry::RestoreRegistry;
pub use session::{RestoreBounds, RestoreProgress, RestoreSession};

use crate::codec::CodecError;
use crate::id::TxId;
use crate::transport::TransportError;

/// Result type for restore operations.
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Errors that start or end a restore.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("Transaction log unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("Corrupt transaction log entry: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid {field} '{value}': {source}")]
    InvalidId {
        field: &'static str,
        value: String,
        #[source]
        source: ulid::DecodeError,
    },

    #[error("Entry {id} has unrecognized method '{method}'")]
    UnrecognizedMethod { id: TxId, method: String },
}
