//! Error types for kwnode.

use kw_alerts::NotifyError;
use thiserror::Error;

/// Errors that can occur while watching the cluster.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A startup check against the cluster failed.
    #[error("setup check failed for {target}: {reason}")]
    Setup {
        /// What was checked, e.g. `nodes` or `namespace 'default'`.
        target: String,
        /// Why it failed.
        reason: String,
    },

    /// Listing resources failed.
    #[error("failed to list {resource}: {reason}")]
    Listing {
        /// Resource being listed.
        resource: String,
        /// Why it failed.
        reason: String,
    },

    /// Node metrics could not be read.
    #[error("metrics collection failed: {0}")]
    Metrics(String),

    /// Kubernetes API error.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// Notification delivery failed.
    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

impl WatchError {
    /// Builds a listing error.
    pub fn listing(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Listing {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a setup error.
    pub fn setup(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Setup {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for kwnode operations.
pub type Result<T> = std::result::Result<T, WatchError>;
