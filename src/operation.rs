//! Write operations as they flow between the saga engine and the log.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::id::TxId;

/// Method recorded on a log entry.
///
/// The log accepts any method string so entries written by newer schema
/// versions stay readable; replay only acts on `Put` and `Delete`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Put,
    Delete,
    Unrecognized(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Unrecognized(other) => other,
        }
    }

    pub fn parse(method: &str) -> Self {
        match method {
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            other => Method::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named saga graphs the core submits to.
///
/// The `NoTxLog` variants run the same backend writes without the log-append
/// step. Replay always uses them so it never appends to the log it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaName {
    CreateOrOverwrite,
    Delete,
    CreateOrOverwriteNoTxLog,
    DeleteNoTxLog,
}

impl SagaName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaName::CreateOrOverwrite => "create-or-overwrite",
            SagaName::Delete => "delete",
            SagaName::CreateOrOverwriteNoTxLog => "create-or-overwrite-no-txlog",
            SagaName::DeleteNoTxLog => "delete-no-txlog",
        }
    }

    /// Saga used to replay an entry with the given method.
    pub fn for_replay(method: &Method) -> Option<Self> {
        match method {
            Method::Put => Some(SagaName::CreateOrOverwriteNoTxLog),
            Method::Delete => Some(SagaName::DeleteNoTxLog),
            Method::Unrecognized(_) => None,
        }
    }

    pub fn appends_to_log(&self) -> bool {
        matches!(self, SagaName::CreateOrOverwrite | SagaName::Delete)
    }
}

impl fmt::Display for SagaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded input of one document write, as handed to a saga.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInput {
    pub tx_id: TxId,
    pub method: Method,
    pub schema: String,
    pub namespace: String,
    pub entity: String,
    pub id: String,
    /// Version timestamp of the document, with the writer's zone offset.
    pub version: DateTime<FixedOffset>,
    /// Full document body. Absent for deletes.
    pub body: Option<serde_json::Value>,
}

impl OperationInput {
    /// Same operation with a different method.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    /// `namespace/entity/id`, for logging.
    pub fn resource(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.entity, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_known() {
        assert_eq!(Method::parse("PUT"), Method::Put);
        assert_eq!(Method::parse("DELETE"), Method::Delete);
    }

    #[test]
    fn test_method_parse_is_case_sensitive() {
        assert_eq!(Method::parse("put"), Method::Unrecognized("put".to_string()));
    }

    #[test]
    fn test_unrecognized_method_keeps_its_text() {
        let method = Method::parse("PATCH");
        assert_eq!(method.as_str(), "PATCH");
    }

    #[test]
    fn test_replay_sagas_never_append() {
        for method in [Method::Put, Method::Delete] {
            let saga = SagaName::for_replay(&method).unwrap();
            assert!(!saga.appends_to_log());
        }
        assert!(SagaName::for_replay(&Method::parse("PATCH")).is_none());
    }
}
