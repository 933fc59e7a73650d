//! Snapshot sources.
//!
//! A [`SnapshotSource`] lists the cluster's nodes and pods as classifier
//! snapshots and reads node usage metrics. [`KubeSource`](crate::KubeSource)
//! talks to a real API server; [`FakeSource`] serves canned snapshots for
//! tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kw_observe::{NodeSnapshot, PodSnapshot, UsageSample};
use parking_lot::RwLock;

use crate::error::{Result, WatchError};

/// Node usage samples for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMetrics {
    /// Whether the metrics backend is reachable.
    pub available: bool,
    /// Usage by node name.
    pub samples: HashMap<String, UsageSample>,
}

impl NodeMetrics {
    /// Metrics from a reachable backend.
    #[must_use]
    pub fn available(samples: HashMap<String, UsageSample>) -> Self {
        Self {
            available: true,
            samples,
        }
    }

    /// No metrics backend; pressure checks are skipped.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Gets the sample of one node.
    #[must_use]
    pub fn sample(&self, node: &str) -> Option<&UsageSample> {
        self.samples.get(node)
    }
}

/// Trait for reading cluster state.
#[allow(async_fn_in_trait)]
pub trait SnapshotSource {
    /// Lists all nodes.
    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>>;

    /// Lists the pods of one namespace.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>>;

    /// Reads current node usage.
    async fn node_metrics(&self) -> Result<NodeMetrics>;

    /// Checks that nodes can be listed.
    async fn verify_nodes(&self) -> Result<()> {
        self.list_nodes()
            .await
            .map(|_| ())
            .map_err(|e| WatchError::setup("nodes", e))
    }

    /// Checks that a namespace exists and is readable.
    async fn verify_namespace(&self, namespace: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct FakeState {
    nodes: Vec<NodeSnapshot>,
    pods: HashMap<String, Vec<PodSnapshot>>,
    metrics: NodeMetrics,
    namespaces: HashSet<String>,
    node_error: Option<String>,
    pod_errors: HashMap<String, String>,
    metrics_error: Option<String>,
}

/// In-memory snapshot source.
///
/// Clones share state, so a test can keep a handle and change the cluster
/// between cycles while the runner owns another clone.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    state: Arc<RwLock<FakeState>>,
}

impl FakeSource {
    /// Creates an empty cluster with no metrics backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the node list.
    pub fn set_nodes(&self, nodes: Vec<NodeSnapshot>) {
        self.state.write().nodes = nodes;
    }

    /// Adds or replaces a node by name.
    pub fn upsert_node(&self, node: NodeSnapshot) {
        let mut state = self.state.write();
        match state.nodes.iter_mut().find(|n| n.name == node.name) {
            Some(existing) => *existing = node,
            None => state.nodes.push(node),
        }
    }

    /// Removes a node by name.
    pub fn remove_node(&self, name: &str) {
        self.state.write().nodes.retain(|n| n.name != name);
    }

    /// Replaces the pods of a namespace, creating the namespace.
    pub fn set_pods(&self, namespace: &str, pods: Vec<PodSnapshot>) {
        let mut state = self.state.write();
        state.namespaces.insert(namespace.to_string());
        state.pods.insert(namespace.to_string(), pods);
    }

    /// Adds or replaces a pod by name in its namespace.
    pub fn upsert_pod(&self, pod: PodSnapshot) {
        let mut state = self.state.write();
        state.namespaces.insert(pod.namespace.clone());
        let pods = state.pods.entry(pod.namespace.clone()).or_default();
        match pods.iter_mut().find(|p| p.name == pod.name) {
            Some(existing) => *existing = pod,
            None => pods.push(pod),
        }
    }

    /// Removes a pod.
    pub fn remove_pod(&self, namespace: &str, name: &str) {
        if let Some(pods) = self.state.write().pods.get_mut(namespace) {
            pods.retain(|p| p.name != name);
        }
    }

    /// Creates an empty namespace.
    pub fn add_namespace(&self, namespace: &str) {
        self.state.write().namespaces.insert(namespace.to_string());
    }

    /// Replaces the metrics returned by [`SnapshotSource::node_metrics`].
    pub fn set_metrics(&self, metrics: NodeMetrics) {
        self.state.write().metrics = metrics;
    }

    /// Makes node listing fail with `reason`, or succeed again with `None`.
    pub fn fail_nodes(&self, reason: Option<&str>) {
        self.state.write().node_error = reason.map(str::to_string);
    }

    /// Makes pod listing in `namespace` fail with `reason`, or succeed again.
    pub fn fail_pods(&self, namespace: &str, reason: Option<&str>) {
        let mut state = self.state.write();
        match reason {
            Some(reason) => {
                state
                    .pod_errors
                    .insert(namespace.to_string(), reason.to_string());
            }
            None => {
                state.pod_errors.remove(namespace);
            }
        }
    }

    /// Makes the metrics query fail with `reason`, or succeed again.
    pub fn fail_metrics(&self, reason: Option<&str>) {
        self.state.write().metrics_error = reason.map(str::to_string);
    }
}

impl SnapshotSource for FakeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        let state = self.state.read();
        if let Some(reason) = &state.node_error {
            return Err(WatchError::listing("nodes", reason));
        }
        Ok(state.nodes.clone())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>> {
        let state = self.state.read();
        if let Some(reason) = state.pod_errors.get(namespace) {
            return Err(WatchError::listing(
                format!("pods in namespace '{namespace}'"),
                reason,
            ));
        }
        Ok(state.pods.get(namespace).cloned().unwrap_or_default())
    }

    async fn node_metrics(&self) -> Result<NodeMetrics> {
        let state = self.state.read();
        if let Some(reason) = &state.metrics_error {
            return Err(WatchError::Metrics(reason.clone()));
        }
        Ok(state.metrics.clone())
    }

    async fn verify_namespace(&self, namespace: &str) -> Result<()> {
        if self.state.read().namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(WatchError::setup(
                format!("namespace '{namespace}'"),
                "namespace not found",
            ))
        }
    }
}
