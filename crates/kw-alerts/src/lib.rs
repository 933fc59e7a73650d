//! Problem lifecycle tracking and alert delivery for kubewatch.
//!
//! `kw-alerts` keeps one [`ProblemRecord`] per (resource, problem kind),
//! debounces reports and resolutions with the per-kind thresholds carried
//! by [`kw_observe::ProblemKind`], and delivers the resulting messages
//! through a [`Notifier`].
//!
//! # Features
//!
//! - **Debounced reporting**: a problem is reported once it has been seen in
//!   enough consecutive cycles, and never twice
//! - **Debounced resolution**: a reported problem is announced as fixed once
//!   it has been absent for enough consecutive cycles
//! - **Staleness sweep**: records for resources that vanished are dropped
//!   silently after 30 minutes
//! - **Notification channels**: Slack with transient-failure retry, tracing
//!   log, in-memory capture
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use kw_alerts::ProblemRegistry;
//! use kw_observe::{Detection, ProblemKind, ResourceIdentity};
//!
//! let mut registry = ProblemRegistry::new();
//! let detection = Detection::new(
//!     ResourceIdentity::node("worker-1"),
//!     ProblemKind::NodeResourcePressure,
//!     "Node worker-1 has constantly around 100% cpu usage",
//! );
//!
//! // Resource pressure is reported on the tenth consecutive detection.
//! for _ in 0..9 {
//!     assert!(!registry.observe(&detection, Utc::now()).report_due);
//! }
//! assert!(registry.observe(&detection, Utc::now()).report_due);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod error;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use channels::{
    LogChannel, MemoryChannel, Notifier, SlackChannel, SlackChannelInfo, SlackConfig,
    SlackResponse, SLACK_API_URL,
};
pub use error::{NotifyError, Result};
pub use manager::{CycleSummary, GreetingFn, ProblemManager};
pub use registry::{default_staleness_window, Observation, ProblemRegistry};
pub use retry::{retry_with_backoff, RetryConfig};
pub use types::{DedupKey, ProblemRecord};
