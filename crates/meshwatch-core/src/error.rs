//! Error taxonomy for collection runs.
//!
//! Only [`Error::Configuration`] is fatal to a run. Transport, parse and
//! persistence errors are caught at node or record granularity by the
//! orchestrator and reported as status lines.

use std::path::PathBuf;
use std::time::Duration;

use crate::request::RequestKind;

/// Errors produced by the collection engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A query exceeded its time budget.
    #[error("{kind} query to {node} timed out after {}s", timeout.as_secs_f64())]
    TransportTimeout {
        node: String,
        kind: RequestKind,
        timeout: Duration,
    },

    /// The executor could not complete a query (non-zero exit, spawn failure, ...).
    #[error("{kind} query to {node} failed: {reason}")]
    TransportFailure {
        node: String,
        kind: RequestKind,
        reason: String,
    },

    /// Raw text did not yield any usable metric.
    #[error("parse failure: {reason}")]
    ParseFailure { reason: String },

    /// Writing a record or header to disk failed.
    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid thresholds, paths or node ids. Fatal before the first cycle.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The downstream renderer reported a failure.
    #[error("render failed: {0}")]
    Render(String),

    /// Run statistics could not be encoded.
    #[error("failed to encode run statistics: {0}")]
    Stats(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with the path it concerns.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for the transport errors that the retry policy handles.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. } | Self::TransportFailure { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
