//! # kw-observe
//!
//! Resource snapshots and problem classification for kubewatch.
//!
//! This crate turns a point-in-time view of a node or a pod into at most one
//! [`Detection`]. It holds no state: the debounce and lifecycle logic lives
//! in `kw-alerts`.
//!
//! ## Quick Start
//!
//! ```rust
//! use kw_observe::{classify_node, ConditionSnapshot, NodeSnapshot, ProblemKind};
//!
//! let node = NodeSnapshot::new("worker-1")
//!     .with_condition(ConditionSnapshot::new("DiskPressure", "True"));
//!
//! let detection = classify_node(&node, None, false).unwrap();
//! assert_eq!(detection.kind, ProblemKind::NodeCondition);
//! assert_eq!(detection.kind.report_threshold(), 1);
//! ```

#![forbid(unsafe_code)]

pub mod detectors;
pub mod formatter;
pub mod types;

pub use detectors::{
    classify_node, classify_pod, is_critical_status, is_okay_status, pod_status,
    CRITICAL_STATUSES, OKAY_STATUSES, SATURATION_THRESHOLD,
};
pub use formatter::{format_report, format_resolve, greeting, select_greeting};
pub use types::{
    ConditionSnapshot, ContainerState, ContainerStatusSnapshot, Detection, KindPolicy,
    NodeSnapshot, PodSnapshot, ProblemKind, ResourceIdentity, ResourceKind, ResourceQuantities,
    TerminatedState, UsageSample,
};
