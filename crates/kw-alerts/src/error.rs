//! Error types for the kw-alerts crate.

use thiserror::Error;

/// Errors raised while delivering or configuring notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Channel configuration is unusable.
    #[error("invalid channel configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// Notification delivery failed.
    #[error("notification failed: {reason}")]
    NotificationFailed {
        /// The reason the notification failed.
        reason: String,
    },

    /// The HTTP endpoint answered with a non-success status.
    #[error("unexpected HTTP status {status} from {endpoint}")]
    Status {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// Slack accepted the request but reported an error.
    #[error("slack api error: {0}")]
    SlackApi(String),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl NotifyError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig { .. }
            | Self::NotificationFailed { .. }
            | Self::SlackApi(_) => false,
        }
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
