//! Kubernetes API snapshot source.
//!
//! Lists nodes and pods through the API server and reads node usage from
//! the `metrics.k8s.io/v1beta1` resource metrics API. Uses in-cluster
//! configuration when available and falls back to the local kubeconfig.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::{
    ContainerState as ApiContainerState, ContainerStateTerminated, ContainerStatus, Namespace,
    Node, Pod,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::Client;
use kw_observe::{
    ConditionSnapshot, ContainerState, ContainerStatusSnapshot, NodeSnapshot, PodSnapshot,
    ResourceQuantities, TerminatedState, UsageSample,
};
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};
use crate::quantity::{parse_cpu_millis, parse_memory_bytes};
use crate::source::{NodeMetrics, SnapshotSource};

/// API group of the resource metrics API.
pub const METRICS_GROUP: &str = "metrics.k8s.io";

/// Version of the resource metrics API.
pub const METRICS_VERSION: &str = "v1beta1";

/// Snapshot source backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
    metrics_available: bool,
}

impl std::fmt::Debug for KubeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSource")
            .field("metrics_available", &self.metrics_available)
            .finish_non_exhaustive()
    }
}

impl KubeSource {
    /// Connects using in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns an error if no cluster configuration can be loaded.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client).await)
    }

    /// Wraps an existing client and probes for the metrics API once.
    pub async fn with_client(client: Client) -> Self {
        let metrics_available = probe_metrics_api(&client).await;
        info!(metrics_available, "kubernetes client initialized");
        Self {
            client,
            metrics_available,
        }
    }

    /// Whether the metrics API was found at startup.
    #[must_use]
    pub const fn metrics_available(&self) -> bool {
        self.metrics_available
    }
}

async fn probe_metrics_api(client: &Client) -> bool {
    match client.list_api_groups().await {
        Ok(list) => list.groups.iter().any(|group| {
            group.name == METRICS_GROUP
                && group.versions.iter().any(|v| v.version == METRICS_VERSION)
        }),
        Err(e) => {
            warn!(error = %e, "failed to discover api groups, node metrics disabled");
            false
        }
    }
}

fn metrics_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, "NodeMetrics");
    ApiResource::from_gvk_with_plural(&gvk, "nodes")
}

impl SnapshotSource for KubeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WatchError::listing("nodes", e))?;

        Ok(nodes.items.iter().map(node_snapshot).collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSnapshot>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WatchError::listing(format!("pods in namespace '{namespace}'"), e))?;

        Ok(pods.items.iter().map(pod_snapshot).collect())
    }

    async fn node_metrics(&self) -> Result<NodeMetrics> {
        if !self.metrics_available {
            return Ok(NodeMetrics::unavailable());
        }

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &metrics_resource());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WatchError::Metrics(e.to_string()))?;

        let samples: HashMap<String, UsageSample> =
            list.items.iter().filter_map(usage_sample).collect();
        debug!(nodes = samples.len(), "read node metrics");

        Ok(NodeMetrics::available(samples))
    }

    async fn verify_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(namespace)
            .await
            .map(|_| ())
            .map_err(|e| WatchError::setup(format!("namespace '{namespace}'"), e))
    }
}

fn quantities(resources: Option<&BTreeMap<String, Quantity>>) -> Option<ResourceQuantities> {
    let resources = resources?;
    let cpu = resources
        .get("cpu")
        .and_then(|q| parse_cpu_millis(&q.0))
        .unwrap_or_default();
    let memory = resources
        .get("memory")
        .and_then(|q| parse_memory_bytes(&q.0))
        .unwrap_or_default();
    Some(ResourceQuantities::new(cpu, memory))
}

/// Converts an API node into a classifier snapshot.
#[must_use]
pub fn node_snapshot(node: &Node) -> NodeSnapshot {
    let mut snapshot = NodeSnapshot::new(node.metadata.name.clone().unwrap_or_default());

    let Some(status) = &node.status else {
        return snapshot;
    };

    for condition in status.conditions.iter().flatten() {
        snapshot = snapshot.with_condition(
            ConditionSnapshot::new(&condition.type_, &condition.status)
                .with_message(condition.message.clone().unwrap_or_default()),
        );
    }

    if let Some(capacity) = quantities(status.capacity.as_ref()) {
        snapshot = snapshot.with_capacity(capacity);
    }
    if let Some(allocatable) = quantities(status.allocatable.as_ref()) {
        snapshot = snapshot.with_allocatable(allocatable);
    }

    snapshot
}

fn terminated_state(terminated: &ContainerStateTerminated) -> TerminatedState {
    let mut state = TerminatedState::new(terminated.exit_code)
        .with_reason(terminated.reason.clone().unwrap_or_default())
        .with_signal(terminated.signal.unwrap_or_default());
    if let Some(finished) = &terminated.finished_at {
        state = state.finished_at(finished.0);
    }
    state
}

fn container_state(state: Option<&ApiContainerState>) -> ContainerState {
    let Some(state) = state else {
        return ContainerState::Unset;
    };

    if let Some(waiting) = &state.waiting {
        ContainerState::Waiting {
            reason: waiting.reason.clone().unwrap_or_default(),
        }
    } else if let Some(terminated) = &state.terminated {
        ContainerState::Terminated(terminated_state(terminated))
    } else if state.running.is_some() {
        ContainerState::Running
    } else {
        ContainerState::Unset
    }
}

fn container_status(status: &ContainerStatus) -> ContainerStatusSnapshot {
    ContainerStatusSnapshot {
        name: status.name.clone(),
        ready: status.ready,
        state: container_state(status.state.as_ref()),
        last_terminated: status
            .last_state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .map(terminated_state),
    }
}

/// Converts an API pod into a classifier snapshot.
#[must_use]
pub fn pod_snapshot(pod: &Pod) -> PodSnapshot {
    let status = pod.status.as_ref();
    let mut snapshot = PodSnapshot::new(
        pod.metadata.namespace.clone().unwrap_or_default(),
        pod.metadata.name.clone().unwrap_or_default(),
        status.and_then(|s| s.phase.clone()).unwrap_or_default(),
    );

    if let Some(reason) = status
        .and_then(|s| s.reason.as_deref())
        .filter(|r| !r.is_empty())
    {
        snapshot = snapshot.with_reason(reason);
    }
    if let Some(deleted) = &pod.metadata.deletion_timestamp {
        snapshot = snapshot.deleted_at(deleted.0);
    }

    snapshot.init_container_count = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.init_containers.as_ref())
        .map_or(0, Vec::len);

    if let Some(status) = status {
        snapshot.init_container_statuses = status
            .init_container_statuses
            .iter()
            .flatten()
            .map(container_status)
            .collect();
        snapshot.container_statuses = status
            .container_statuses
            .iter()
            .flatten()
            .map(container_status)
            .collect();
    }

    snapshot
}

/// Extracts the usage sample of one `NodeMetrics` object.
#[must_use]
pub fn usage_sample(object: &DynamicObject) -> Option<(String, UsageSample)> {
    let name = object.metadata.name.clone()?;
    let usage = object.data.get("usage")?;
    let cpu = parse_cpu_millis(usage.get("cpu")?.as_str()?)?;
    let memory = parse_memory_bytes(usage.get("memory")?.as_str()?)?;
    Some((name, UsageSample::new(cpu, memory)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use kw_observe::{classify_node, classify_pod, pod_status, ProblemKind};
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_node_conversion() {
        let node = node(json!({
            "metadata": { "name": "worker-1" },
            "status": {
                "capacity": { "cpu": "4", "memory": "16Gi" },
                "allocatable": { "cpu": "3800m", "memory": "15Gi" },
                "conditions": [
                    { "type": "MemoryPressure", "status": "False" },
                    { "type": "DiskPressure", "status": "True", "message": "disk full" },
                    { "type": "Ready", "status": "True" }
                ]
            }
        }));

        let snapshot = node_snapshot(&node);
        assert_eq!(snapshot.name, "worker-1");
        assert_eq!(snapshot.conditions.len(), 3);
        assert_eq!(snapshot.conditions[1].message, "disk full");
        assert!((snapshot.capacity.cpu_millis - 4000.0).abs() < 1e-6);
        let allocatable = snapshot.allocatable.unwrap();
        assert!((allocatable.cpu_millis - 3800.0).abs() < 1e-6);
        assert!((allocatable.memory_bytes - 15.0 * 1024.0 * 1024.0 * 1024.0).abs() < 1.0);

        let detection = classify_node(&snapshot, None, false).unwrap();
        assert_eq!(detection.kind, ProblemKind::NodeCondition);
        assert!(detection.message.contains("DiskPressure=True: disk full"));
    }

    #[test]
    fn test_node_without_status() {
        let snapshot = node_snapshot(&node(json!({ "metadata": { "name": "bare" } })));
        assert!(snapshot.conditions.is_empty());
        assert!(snapshot.allocatable.is_none());
    }

    #[test]
    fn test_pod_conversion_crash_loop() {
        let pod = pod(json!({
            "metadata": { "name": "web-0", "namespace": "default" },
            "spec": { "containers": [{ "name": "app" }] },
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app",
                    "ready": false,
                    "restartCount": 5,
                    "image": "app:1",
                    "imageID": "",
                    "state": { "waiting": { "reason": "CrashLoopBackOff" } },
                    "lastState": {
                        "terminated": {
                            "exitCode": 1,
                            "reason": "Error",
                            "finishedAt": "2024-05-01T11:59:00Z"
                        }
                    }
                }]
            }
        }));

        let snapshot = pod_snapshot(&pod);
        assert_eq!(snapshot.identity().to_string(), "Pod default/web-0");
        assert_eq!(snapshot.container_statuses.len(), 1);
        let last = snapshot.container_statuses[0].last_terminated.as_ref().unwrap();
        assert_eq!(last.exit_code, 1);
        assert_eq!(pod_status(&snapshot), "CrashLoopBackOff");

        let now: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let detection = classify_pod(&snapshot, now).unwrap();
        assert_eq!(detection.kind, ProblemKind::PodCriticalStatus);
    }

    #[test]
    fn test_pod_conversion_init_containers() {
        let pod = pod(json!({
            "metadata": { "name": "job-0", "namespace": "batch" },
            "spec": {
                "initContainers": [{ "name": "setup" }, { "name": "migrate" }],
                "containers": [{ "name": "app" }]
            },
            "status": {
                "phase": "Pending",
                "initContainerStatuses": [{
                    "name": "setup",
                    "ready": false,
                    "restartCount": 0,
                    "image": "setup:1",
                    "imageID": "",
                    "state": { "terminated": { "exitCode": 1, "signal": 9 } }
                }]
            }
        }));

        let snapshot = pod_snapshot(&pod);
        assert_eq!(snapshot.init_container_count, 2);
        assert_eq!(pod_status(&snapshot), "Init:Signal:9");
    }

    #[test]
    fn test_pod_conversion_terminating() {
        let pod = pod(json!({
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "deletionTimestamp": "2024-05-01T12:00:00Z"
            },
            "status": { "phase": "Running", "reason": "NodeLost" }
        }));

        let snapshot = pod_snapshot(&pod);
        assert!(snapshot.deletion_timestamp.is_some());
        assert_eq!(snapshot.reason.as_deref(), Some("NodeLost"));
        assert_eq!(pod_status(&snapshot), "Unknown");
    }

    #[test]
    fn test_empty_pod_reason_ignored() {
        let snapshot = pod_snapshot(&pod(json!({
            "metadata": { "name": "p", "namespace": "default" },
            "status": { "phase": "Running", "reason": "" }
        })));
        assert!(snapshot.reason.is_none());
    }

    #[test]
    fn test_usage_sample() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": { "name": "worker-1" },
            "timestamp": "2024-05-01T12:00:00Z",
            "window": "10s",
            "usage": { "cpu": "250000000n", "memory": "1024Ki" }
        }))
        .unwrap();

        let (name, sample) = usage_sample(&object).unwrap();
        assert_eq!(name, "worker-1");
        assert!((sample.cpu_millis - 250.0).abs() < 1e-6);
        assert!((sample.memory_bytes - 1_048_576.0).abs() < 1e-6);
    }

    #[test]
    fn test_usage_sample_missing_usage() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": { "name": "worker-1" }
        }))
        .unwrap();
        assert!(usage_sample(&object).is_none());
    }

    #[test]
    fn test_metrics_resource() {
        let resource = metrics_resource();
        assert_eq!(resource.group, METRICS_GROUP);
        assert_eq!(resource.version, METRICS_VERSION);
        assert_eq!(resource.plural, "nodes");
        assert_eq!(resource.api_version, "metrics.k8s.io/v1beta1");
    }
}
