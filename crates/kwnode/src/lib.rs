//! kwnode - Kubernetes problem watcher
//!
//! Periodically classifies the cluster's nodes and the pods of selected
//! namespaces, tracks every detected problem through the `kw-alerts`
//! registry and posts debounced report and resolve messages to Slack.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod quantity;
pub mod runner;
pub mod source;

pub use config::{LogFormat, RunArgs, SlackSettings, WatchConfig};
pub use error::{Result, WatchError};
pub use kubernetes::KubeSource;
pub use runner::{next_wait, Runner};
pub use source::{FakeSource, NodeMetrics, SnapshotSource};
