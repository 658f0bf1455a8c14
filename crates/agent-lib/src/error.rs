//! Error types for the vSphere agent.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the agent library.
#[derive(Error, Debug)]
pub enum AgentError {
    // Collaborator errors
    #[error("{service} service unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    // Per-object errors
    #[error("Failed to create {kind} entity '{id}': {reason}")]
    EntityCreation {
        kind: String,
        id: String,
        reason: String,
    },

    #[error("Failed to write metric '{key}': {reason}")]
    MetricWrite { key: String, reason: String },

    #[error("Performance data incomplete: {failed} of {total} queries failed ({chunks})")]
    PartialPerformanceData {
        failed: usize,
        total: usize,
        chunks: String,
    },

    #[error("Failed to read inventory snapshot {path:?}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse inventory snapshot: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

impl AgentError {
    pub fn service_unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        AgentError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
