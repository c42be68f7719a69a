//! Log entry codec.
//!
//! An entry carries two named parts:
//! - `meta`: JSON object with method, schema, namespace, entity, id and version
//! - `data`: the document body as JSON, present only for writes with a body
//!
//! Keeping the body in its own part lets consumers read metadata without
//! materializing large documents.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::id::TxId;
use crate::operation::{Method, OperationInput};
use crate::transport::LogMessage;

/// Name of the metadata part.
pub const META_PART: &str = "meta";
/// Name of the document body part.
pub const DATA_PART: &str = "data";

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors decoding or encoding a log entry.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Entry {id} has no '{part}' part")]
    MissingPart { id: TxId, part: &'static str },

    #[error("Entry {id} has malformed '{part}' part: {source}")]
    Malformed {
        id: TxId,
        part: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Entry {id} has invalid version timestamp: {source}")]
    InvalidVersion {
        id: TxId,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    schema: String,
    namespace: String,
    entity: String,
    id: String,
    version: String,
}

/// Position string for an operation: `entity/id/versionEpochMillis`.
pub fn position_of(input: &OperationInput) -> String {
    format!(
        "{}/{}/{}",
        input.entity,
        input.id,
        input.version.timestamp_millis()
    )
}

/// Encode an operation as a log entry whose id is the transaction id.
pub fn encode(input: &OperationInput) -> Result<LogMessage> {
    let meta = EntryMeta {
        method: input.method.as_str().to_string(),
        schema: input.schema.clone(),
        namespace: input.namespace.clone(),
        entity: input.entity.clone(),
        id: input.id.clone(),
        version: input.version.to_rfc3339(),
    };

    let mut message = LogMessage::new(input.tx_id, position_of(input))
        .with_part(META_PART, serde_json::to_vec(&meta)?);
    if let Some(body) = &input.body {
        message = message.with_part(DATA_PART, serde_json::to_vec(body)?);
    }
    Ok(message)
}

/// Decode a log entry back into an operation.
///
/// Any failure here means the log itself is corrupt.
pub fn decode(message: &LogMessage) -> Result<OperationInput> {
    let raw = message.part(META_PART).ok_or(CodecError::MissingPart {
        id: message.id,
        part: META_PART,
    })?;
    let meta: EntryMeta = serde_json::from_slice(raw).map_err(|source| CodecError::Malformed {
        id: message.id,
        part: META_PART,
        source,
    })?;

    let version =
        DateTime::parse_from_rfc3339(&meta.version).map_err(|source| CodecError::InvalidVersion {
            id: message.id,
            source,
        })?;

    let body = match message.part(DATA_PART) {
        Some(raw) => Some(serde_json::from_slice(raw).map_err(|source| {
            CodecError::Malformed {
                id: message.id,
                part: DATA_PART,
                source,
            }
        })?),
        None => None,
    };

    Ok(OperationInput {
        tx_id: message.id,
        method: Method::parse(&meta.method),
        schema: meta.schema,
        namespace: meta.namespace,
        entity: meta.entity,
        id: meta.id,
        version,
        body,
    })
}
