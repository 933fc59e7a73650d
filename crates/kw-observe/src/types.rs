//! Core types shared by the classifiers and the alerting pipeline.
//!
//! - [`ResourceKind`] and [`ResourceIdentity`]: which cluster object a problem belongs to
//! - [`ProblemKind`] and [`KindPolicy`]: the closed set of problems and their debounce policy
//! - [`Detection`]: the single problem a classifier found for one resource in one cycle
//! - Node and pod snapshots consumed by the classifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type of cluster object being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A cluster node.
    Node,
    /// A namespaced pod.
    Pod,
}

impl ResourceKind {
    /// Returns the kind as it appears in alert messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Pod => "Pod",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one watched object. Nodes always carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// Object type.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// Namespace, empty for cluster-scoped objects.
    pub namespace: String,
}

impl ResourceIdentity {
    /// Identity of a node.
    #[must_use]
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Node,
            name: name.into(),
            namespace: String::new(),
        }
    }

    /// Identity of a pod.
    #[must_use]
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Pod,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Returns true if the object is namespaced.
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_namespaced() {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        } else {
            write!(f, "{} {}", self.kind, self.name)
        }
    }
}

/// Debounce policy attached to a [`ProblemKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Consecutive detections required before the first report.
    pub report_threshold: u32,
    /// Consecutive clean cycles required before the problem is resolved.
    pub resolve_threshold: u32,
}

/// The closed set of problems kubewatch can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProblemKind {
    /// A node condition is in an unhealthy state.
    NodeCondition,
    /// A node is saturated or its usage metrics went missing.
    NodeResourcePressure,
    /// A pod is in one of the critical display statuses.
    PodCriticalStatus,
    /// A pod is neither running nor critical (scheduling, pulling, initializing...).
    PodPending,
    /// A container of a running pod terminated with a non-zero exit code recently.
    PodRestart,
}

impl ProblemKind {
    /// Every problem kind.
    pub const ALL: [Self; 5] = [
        Self::NodeCondition,
        Self::NodeResourcePressure,
        Self::PodCriticalStatus,
        Self::PodPending,
        Self::PodRestart,
    ];

    /// Returns the debounce policy for this kind.
    #[must_use]
    pub const fn policy(&self) -> KindPolicy {
        match self {
            Self::NodeCondition => KindPolicy {
                report_threshold: 1,
                resolve_threshold: 1,
            },
            Self::NodeResourcePressure => KindPolicy {
                report_threshold: 10,
                resolve_threshold: 5,
            },
            Self::PodCriticalStatus => KindPolicy {
                report_threshold: 1,
                resolve_threshold: 10,
            },
            Self::PodPending => KindPolicy {
                report_threshold: 30,
                resolve_threshold: 10,
            },
            // Restart detection is edge-triggered, so the first clean cycle resolves it.
            Self::PodRestart => KindPolicy {
                report_threshold: 1,
                resolve_threshold: 1,
            },
        }
    }

    /// Consecutive detections required before the first report.
    #[must_use]
    pub const fn report_threshold(&self) -> u32 {
        self.policy().report_threshold
    }

    /// Consecutive clean cycles required before resolving.
    #[must_use]
    pub const fn resolve_threshold(&self) -> u32 {
        self.policy().resolve_threshold
    }

    /// The resource type this kind applies to.
    #[must_use]
    pub const fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::NodeCondition | Self::NodeResourcePressure => ResourceKind::Node,
            Self::PodCriticalStatus | Self::PodPending | Self::PodRestart => ResourceKind::Pod,
        }
    }

    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NodeCondition => "NodeCondition",
            Self::NodeResourcePressure => "NodeResourcePressure",
            Self::PodCriticalStatus => "PodCriticalStatus",
            Self::PodPending => "PodPending",
            Self::PodRestart => "PodRestart",
        }
    }
}

impl std::fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found on one resource during one cycle.
///
/// Classifiers produce at most one detection per resource per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// The affected resource.
    pub identity: ResourceIdentity,
    /// What is wrong with it.
    pub kind: ProblemKind,
    /// Human-readable description.
    pub message: String,
}

impl Detection {
    /// Creates a new detection.
    #[must_use]
    pub fn new(identity: ResourceIdentity, kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            identity,
            kind,
            message: message.into(),
        }
    }
}

/// CPU and memory amounts, normalized to millicores and bytes.
///
/// Used both for node capacity/allocatable and for usage samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    /// CPU in millicores.
    pub cpu_millis: f64,
    /// Memory in bytes.
    pub memory_bytes: f64,
}

impl ResourceQuantities {
    /// Creates a new quantity pair.
    #[must_use]
    pub const fn new(cpu_millis: f64, memory_bytes: f64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }
}

/// A node's current CPU and memory usage as reported by the metrics API.
pub type UsageSample = ResourceQuantities;

/// A single node condition (`Ready`, `DiskPressure`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    /// Condition type.
    pub condition_type: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
    /// Attached message, possibly empty.
    pub message: String,
}

impl ConditionSnapshot {
    /// Creates a condition without a message.
    #[must_use]
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            message: String::new(),
        }
    }

    /// Sets the condition message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Everything the node classifier needs to know about a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// Reported conditions, in API order.
    pub conditions: Vec<ConditionSnapshot>,
    /// Total node capacity.
    pub capacity: ResourceQuantities,
    /// Capacity available to pods, if the node reports it.
    pub allocatable: Option<ResourceQuantities>,
}

impl NodeSnapshot {
    /// Creates a node with no conditions and zero capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: ConditionSnapshot) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: ResourceQuantities) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the allocatable resources.
    #[must_use]
    pub const fn with_allocatable(mut self, allocatable: ResourceQuantities) -> Self {
        self.allocatable = Some(allocatable);
        self
    }

    /// Allocatable resources, falling back to capacity.
    #[must_use]
    pub fn effective_allocatable(&self) -> ResourceQuantities {
        self.allocatable.unwrap_or(self.capacity)
    }

    /// The identity of this node.
    #[must_use]
    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::node(&self.name)
    }
}

/// A terminated container state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedState {
    /// Process exit code.
    pub exit_code: i32,
    /// Signal that killed the process, 0 if none.
    pub signal: i32,
    /// Short reason (`Completed`, `Error`, `OOMKilled`...), possibly empty.
    pub reason: String,
    /// When the container finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TerminatedState {
    /// Creates a terminated state with the given exit code.
    #[must_use]
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the signal.
    #[must_use]
    pub const fn with_signal(mut self, signal: i32) -> Self {
        self.signal = signal;
        self
    }

    /// Sets the finish time.
    #[must_use]
    pub const fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }
}

/// The current state of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// The API reported no state.
    #[default]
    Unset,
    /// Waiting, with an optional reason (empty if none).
    Waiting {
        /// Waiting reason.
        reason: String,
    },
    /// Running.
    Running,
    /// Terminated.
    Terminated(TerminatedState),
}

/// Status of one container (regular or init) in a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatusSnapshot {
    /// Container name.
    pub name: String,
    /// Whether the container passed its readiness checks.
    pub ready: bool,
    /// Current state.
    pub state: ContainerState,
    /// The previous termination, if the container restarted.
    pub last_terminated: Option<TerminatedState>,
}

impl ContainerStatusSnapshot {
    /// A running container.
    #[must_use]
    pub fn running(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
            state: ContainerState::Running,
            last_terminated: None,
        }
    }

    /// A waiting container.
    #[must_use]
    pub fn waiting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: false,
            state: ContainerState::Waiting {
                reason: reason.into(),
            },
            last_terminated: None,
        }
    }

    /// A terminated container.
    #[must_use]
    pub fn terminated(name: impl Into<String>, state: TerminatedState) -> Self {
        Self {
            name: name.into(),
            ready: false,
            state: ContainerState::Terminated(state),
            last_terminated: None,
        }
    }

    /// Sets the previous termination.
    #[must_use]
    pub fn with_last_terminated(mut self, state: TerminatedState) -> Self {
        self.last_terminated = Some(state);
        self
    }
}

/// Everything the pod classifier needs to know about a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    /// Pod namespace.
    pub namespace: String,
    /// Pod name.
    pub name: String,
    /// Pod phase (`Pending`, `Running`, `Succeeded`, `Failed`, `Unknown`).
    pub phase: String,
    /// Pod-level reason, e.g. `Evicted` or `NodeLost`.
    pub reason: Option<String>,
    /// Set once the pod is being deleted.
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Number of init containers declared in the pod spec.
    pub init_container_count: usize,
    /// Init container statuses, in spec order.
    pub init_container_statuses: Vec<ContainerStatusSnapshot>,
    /// Regular container statuses, in spec order.
    pub container_statuses: Vec<ContainerStatusSnapshot>,
}

impl PodSnapshot {
    /// Creates a pod in the given phase with no containers.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            phase: phase.into(),
            ..Self::default()
        }
    }

    /// Sets the pod-level reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks the pod as being deleted.
    #[must_use]
    pub const fn deleted_at(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }

    /// Appends a regular container status.
    #[must_use]
    pub fn with_container(mut self, status: ContainerStatusSnapshot) -> Self {
        self.container_statuses.push(status);
        self
    }

    /// Appends an init container status and counts it in the spec.
    #[must_use]
    pub fn with_init_container(mut self, status: ContainerStatusSnapshot) -> Self {
        self.init_container_statuses.push(status);
        self.init_container_count = self.init_container_statuses.len();
        self
    }

    /// The identity of this pod.
    #[must_use]
    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::pod(&self.namespace, &self.name)
    }
}
