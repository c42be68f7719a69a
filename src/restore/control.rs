//! Restore control surface.
//!
//! Framing-agnostic entry points for outer layers: requests carry ids as
//! strings and an optional source, responses are `RestoreProgress` snapshots.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use super::registry::RestoreRegistry;
use super::session::{RestoreBounds, RestoreProgress};
use super::{RestoreError, Result};
use crate::id::TxId;

/// A request to start a restore.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestoreRequest {
    /// Source to restore. `None` uses the configured default source.
    pub source: Option<String>,
    pub from_id: Option<String>,
    pub from_inclusive: bool,
    pub to_id: Option<String>,
    pub to_inclusive: bool,
}

impl Default for RestoreRequest {
    fn default() -> Self {
        Self {
            source: None,
            from_id: None,
            from_inclusive: true,
            to_id: None,
            to_inclusive: true,
        }
    }
}

impl RestoreRequest {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    /// Parse the id strings into bounds.
    pub fn bounds(&self) -> Result<RestoreBounds> {
        Ok(RestoreBounds {
            from: parse_id("fromId", self.from_id.as_deref())?,
            from_inclusive: self.from_inclusive,
            to: parse_id("toId", self.to_id.as_deref())?,
            to_inclusive: self.to_inclusive,
        })
    }
}

fn parse_id(field: &'static str, value: Option<&str>) -> Result<Option<TxId>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => TxId::from_str(v)
            .map(Some)
            .map_err(|source| RestoreError::InvalidId {
                field,
                value: v.to_string(),
                source,
            }),
    }
}

/// Start/status/stop over a shared registry.
#[derive(Clone)]
pub struct RestoreControl {
    registry: Arc<RestoreRegistry>,
}

impl RestoreControl {
    pub fn new(registry: Arc<RestoreRegistry>) -> Self {
        Self { registry }
    }

    fn source<'a>(&'a self, source: Option<&'a str>) -> &'a str {
        self.registry.pool().source_or_default(source)
    }

    /// Start a restore, or return the progress of the one already running.
    ///
    /// Invalid ids are rejected before any session is created.
    pub async fn start(&self, request: &RestoreRequest) -> Result<RestoreProgress> {
        let bounds = request.bounds()?;
        let source = self.source(request.source.as_deref());
        let session = self.registry.start_or_get(source, bounds).await?;
        Ok(session.progress())
    }

    /// Progress for a source, or `None` if it has never been restored.
    pub async fn status(&self, source: Option<&str>) -> Option<RestoreProgress> {
        self.registry.status(self.source(source)).await
    }

    pub async fn stop(&self, source: Option<&str>) -> Option<RestoreProgress> {
        self.registry.stop(self.source(source)).await
    }

    pub async fn list(&self) -> Vec<RestoreProgress> {
        self.registry.list().await
    }
}
