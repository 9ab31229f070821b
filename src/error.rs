//! Error types for shardkeeper
//!
//! Errors carry enough context (operation, status code, reason) for the
//! caller to log or display them without re-querying the cluster.

use std::fmt;

use thiserror::Error;

/// Main error type for cluster lifecycle operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A request could not be sent, or its response could not be read/decoded
    #[error("transport error [{context}]: {message}")]
    Transport {
        /// Request being made when the failure happened (e.g. "cluster_health")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// The cluster answered with a non-success status code
    #[error("cluster API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code returned by the cluster
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// A snapshot, repository, index or task does not exist
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing object
        what: String,
    },

    /// Invalid construction-time input, rejected before any request is made
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required argument was not provided
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// The action has no indices left to act upon
    #[error("no indices: {0}")]
    NoIndices(String),

    /// The action has no snapshots left to act upon
    #[error("no snapshots: {0}")]
    NoSnapshots(String),

    /// A snapshot is already running in the repository
    #[error("snapshot in progress: {0}")]
    SnapshotInProgress(String),

    /// The cluster reported a definitive failure for an asynchronous operation
    #[error("{operation} failed: {reason}")]
    OperationFailed {
        /// Operation kind being waited on
        operation: String,
        /// Failure text reported by the cluster
        reason: String,
    },

    /// The wait budget ran out before the operation reached a terminal state
    ///
    /// The operation may still be progressing on the cluster.
    #[error("{operation} did not complete within {max_wait}")]
    Timeout {
        /// Operation kind being waited on
        operation: String,
        /// Human-readable budget (e.g. "120s")
        max_wait: String,
    },

    /// An action's post-condition check failed
    #[error("execution failed: {0}")]
    FailedExecution(String),
}

impl Error {
    /// Create a transport error for the named request
    pub fn transport(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an API error from a status code and body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a missing-argument error with the given message
    pub fn missing_argument(msg: impl Into<String>) -> Self {
        Self::MissingArgument(msg.into())
    }

    /// Create a no-indices error with the given message
    pub fn no_indices(msg: impl Into<String>) -> Self {
        Self::NoIndices(msg.into())
    }

    /// Create a failed-execution error with the given message
    pub fn failed_execution(msg: impl Into<String>) -> Self {
        Self::FailedExecution(msg.into())
    }

    /// Whether retrying the same request later could plausibly succeed
    ///
    /// Transport failures, server-side (5xx) errors and a running snapshot are
    /// retryable. Everything else needs an operator or configuration change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::SnapshotInProgress(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
