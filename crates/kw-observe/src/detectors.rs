//! Problem classifiers for nodes and pods.
//!
//! Each classifier is a pure function over an already-fetched snapshot and
//! yields at most one [`Detection`]. Checks are ordered and the first match
//! wins: a resource with several independent problems only surfaces the
//! highest-priority one until that one clears.

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::types::{
    ContainerState, ContainerStatusSnapshot, Detection, NodeSnapshot, PodSnapshot, ProblemKind,
    UsageSample,
};

/// Usage ratio at or above which a node resource counts as saturated.
pub const SATURATION_THRESHOLD: f64 = 0.95;

/// Pod reason set by the node lifecycle controller when a node stops responding.
pub const NODE_UNREACHABLE_POD_REASON: &str = "NodeLost";

/// Display statuses that are reported immediately.
pub const CRITICAL_STATUSES: [&str; 9] = [
    "Error",
    "Unknown",
    "ImagePullBackOff",
    "CrashLoopBackOff",
    "RunContainerError",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
    "Evicted",
];

/// Display statuses of a healthy pod.
pub const OKAY_STATUSES: [&str; 2] = ["Completed", "Running"];

/// How far back a non-zero container termination still counts as a restart.
#[must_use]
pub fn restart_lookback() -> Duration {
    Duration::hours(1)
}

/// Returns true if the display status is in the critical set.
#[must_use]
pub fn is_critical_status(status: &str) -> bool {
    CRITICAL_STATUSES.contains(&status)
}

/// Returns true if the display status is in the okay set.
#[must_use]
pub fn is_okay_status(status: &str) -> bool {
    OKAY_STATUSES.contains(&status)
}

/// Classifies a node.
///
/// `usage` is this node's metrics sample, if any; `metrics_available` says
/// whether the metrics backend answered at all this cycle.
#[must_use]
pub fn classify_node(
    node: &NodeSnapshot,
    usage: Option<&UsageSample>,
    metrics_available: bool,
) -> Option<Detection> {
    if let Some(detection) = check_conditions(node) {
        return Some(detection);
    }

    match usage {
        None if metrics_available => Some(Detection::new(
            node.identity(),
            ProblemKind::NodeResourcePressure,
            format!(
                "Metrics for node {} cannot be retrieved. This could mean the node crashed or is under heavy load",
                node.name
            ),
        )),
        None => None,
        Some(sample) => check_saturation(node, sample),
    }
}

fn check_conditions(node: &NodeSnapshot) -> Option<Detection> {
    for condition in &node.conditions {
        let is_ready = condition.condition_type == "Ready";

        if !is_ready && condition.status != "False" {
            let mut message = format!(
                "Node {} has condition {}={}",
                node.name, condition.condition_type, condition.status
            );
            if !condition.message.is_empty() {
                message.push_str(": ");
                message.push_str(&condition.message);
            }
            return Some(Detection::new(node.identity(), ProblemKind::NodeCondition, message));
        }

        if is_ready && condition.status != "True" {
            let mut message = format!("Node {} has ready status '{}'", node.name, condition.status);
            if !condition.message.is_empty() {
                message.push_str(": ");
                message.push_str(&condition.message);
            }
            return Some(Detection::new(node.identity(), ProblemKind::NodeCondition, message));
        }
    }

    None
}

fn check_saturation(node: &NodeSnapshot, sample: &UsageSample) -> Option<Detection> {
    let allocatable = node.effective_allocatable();
    let cpu = usage_ratio(sample.cpu_millis, allocatable.cpu_millis);
    let memory = usage_ratio(sample.memory_bytes, allocatable.memory_bytes);

    trace!(node = %node.name, ?cpu, ?memory, "node usage");

    let resource = if cpu.is_some_and(|r| r >= SATURATION_THRESHOLD) {
        "cpu"
    } else if memory.is_some_and(|r| r >= SATURATION_THRESHOLD) {
        "memory"
    } else {
        return None;
    };

    Some(Detection::new(
        node.identity(),
        ProblemKind::NodeResourcePressure,
        format!(
            "Node {} has constantly around 100% {resource} usage, this could slow down workloads running on the node",
            node.name
        ),
    ))
}

fn usage_ratio(used: f64, available: f64) -> Option<f64> {
    (available > 0.0).then(|| used / available)
}

/// Derives the status string `kubectl get pods` would display for a pod.
#[must_use]
pub fn pod_status(pod: &PodSnapshot) -> String {
    let mut status = pod
        .reason
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(pod.phase.as_str())
        .to_string();

    let init_status = init_container_status(pod);
    let initializing = init_status.is_some();
    if let Some(init) = init_status {
        status = init;
    }

    if !initializing {
        let mut has_running = false;

        for container in pod.container_statuses.iter().rev() {
            match &container.state {
                ContainerState::Waiting { reason } if !reason.is_empty() => {
                    status.clone_from(reason);
                }
                ContainerState::Terminated(terminated) if !terminated.reason.is_empty() => {
                    status.clone_from(&terminated.reason);
                }
                ContainerState::Terminated(terminated) => {
                    status = if terminated.signal != 0 {
                        format!("Signal:{}", terminated.signal)
                    } else {
                        format!("ExitCode:{}", terminated.exit_code)
                    };
                }
                ContainerState::Running if container.ready => has_running = true,
                _ => {}
            }
        }

        if status == "Completed" && has_running {
            status = "Running".to_string();
        }
    }

    if pod.deletion_timestamp.is_some() {
        status = if pod.reason.as_deref() == Some(NODE_UNREACHABLE_POD_REASON) {
            "Unknown".to_string()
        } else {
            "Terminating".to_string()
        };
    }

    status
}

/// Status of the first init container that has not exited successfully.
fn init_container_status(pod: &PodSnapshot) -> Option<String> {
    for (index, container) in pod.init_container_statuses.iter().enumerate() {
        let status = match &container.state {
            ContainerState::Terminated(t) if t.exit_code == 0 => continue,
            ContainerState::Terminated(t) if t.reason.is_empty() => {
                if t.signal != 0 {
                    format!("Init:Signal:{}", t.signal)
                } else {
                    format!("Init:ExitCode:{}", t.exit_code)
                }
            }
            ContainerState::Terminated(t) => format!("Init:{}", t.reason),
            ContainerState::Waiting { reason } if !reason.is_empty() && reason != "PodInitializing" => {
                format!("Init:{reason}")
            }
            _ => format!("Init:{index}/{}", pod.init_container_count),
        };
        return Some(status);
    }

    None
}

/// Classifies a pod at wall-clock time `now`.
#[must_use]
pub fn classify_pod(pod: &PodSnapshot, now: DateTime<Utc>) -> Option<Detection> {
    let status = pod_status(pod);

    if is_critical_status(&status) {
        return Some(Detection::new(
            pod.identity(),
            ProblemKind::PodCriticalStatus,
            format!(
                "Pod '{}/{}' has critical status '{status}'",
                pod.namespace, pod.name
            ),
        ));
    }

    if is_okay_status(&status) {
        return pod
            .container_statuses
            .iter()
            .find_map(|c| recent_restart(pod, c, now));
    }

    Some(Detection::new(
        pod.identity(),
        ProblemKind::PodPending,
        format!(
            "Pod '{}/{}' is not starting with status '{status}'",
            pod.namespace, pod.name
        ),
    ))
}

fn recent_restart(
    pod: &PodSnapshot,
    container: &ContainerStatusSnapshot,
    now: DateTime<Utc>,
) -> Option<Detection> {
    let last = container.last_terminated.as_ref()?;
    let finished_at = last.finished_at?;
    let elapsed = now.signed_duration_since(finished_at);

    if last.exit_code == 0 || elapsed > restart_lookback() {
        return None;
    }

    Some(Detection::new(
        pod.identity(),
        ProblemKind::PodRestart,
        format!(
            "Pod '{}/{}' has restarted {} seconds ago due to '{}' with exit code '{}'",
            pod.namespace,
            pod.name,
            elapsed.num_seconds(),
            last.reason,
            last.exit_code
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConditionSnapshot, ResourceQuantities, TerminatedState};
    use test_case::test_case;

    fn healthy_node() -> NodeSnapshot {
        NodeSnapshot::new("worker-1")
            .with_condition(ConditionSnapshot::new("MemoryPressure", "False"))
            .with_condition(ConditionSnapshot::new("DiskPressure", "False"))
            .with_condition(ConditionSnapshot::new("Ready", "True"))
            .with_capacity(ResourceQuantities::new(4000.0, 16e9))
            .with_allocatable(ResourceQuantities::new(3800.0, 15e9))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    mod node_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn healthy_node_without_metrics_backend() {
            assert!(classify_node(&healthy_node(), None, false).is_none());
        }

        #[test]
        fn healthy_node_with_low_usage() {
            let usage = ResourceQuantities::new(1000.0, 4e9);
            assert!(classify_node(&healthy_node(), Some(&usage), true).is_none());
        }

        #[test]
        fn disk_pressure_is_reported() {
            let mut node = healthy_node();
            node.conditions[1] =
                ConditionSnapshot::new("DiskPressure", "True").with_message("kubelet has disk pressure");

            let detection = classify_node(&node, None, false).unwrap();
            assert_eq!(detection.kind, ProblemKind::NodeCondition);
            assert!(detection.message.contains("DiskPressure"));
            assert!(detection.message.contains("True"));
            assert!(detection.message.contains("kubelet has disk pressure"));
        }

        #[test]
        fn unknown_condition_status_is_a_problem() {
            let node = NodeSnapshot::new("n").with_condition(ConditionSnapshot::new("PIDPressure", "Unknown"));
            let detection = classify_node(&node, None, false).unwrap();
            assert_eq!(detection.kind, ProblemKind::NodeCondition);
        }

        #[test_case("False" ; "not ready")]
        #[test_case("Unknown" ; "unknown readiness")]
        fn not_ready_is_reported(status: &str) {
            let node = NodeSnapshot::new("worker-2")
                .with_condition(ConditionSnapshot::new("Ready", status).with_message("kubelet stopped posting"));
            let detection = classify_node(&node, None, false).unwrap();
            assert_eq!(detection.kind, ProblemKind::NodeCondition);
            assert!(detection.message.contains(&format!("ready status '{status}'")));
        }

        #[test]
        fn only_first_condition_is_reported() {
            let node = NodeSnapshot::new("n")
                .with_condition(ConditionSnapshot::new("MemoryPressure", "True"))
                .with_condition(ConditionSnapshot::new("DiskPressure", "True"));
            let detection = classify_node(&node, None, false).unwrap();
            assert!(detection.message.contains("MemoryPressure"));
            assert!(!detection.message.contains("DiskPressure"));
        }

        #[test]
        fn condition_wins_over_pressure() {
            let node = NodeSnapshot::new("n").with_condition(ConditionSnapshot::new("Ready", "False"));
            let detection = classify_node(&node, None, true).unwrap();
            assert_eq!(detection.kind, ProblemKind::NodeCondition);
        }

        #[test]
        fn missing_metrics_sample() {
            let detection = classify_node(&healthy_node(), None, true).unwrap();
            assert_eq!(detection.kind, ProblemKind::NodeResourcePressure);
            assert!(detection.message.contains("cannot be retrieved"));
        }

        #[test_case(3700.0, 1e9, Some("cpu") ; "cpu saturated")]
        #[test_case(100.0, 14.5e9, Some("memory") ; "memory saturated")]
        #[test_case(3800.0, 15e9, Some("cpu") ; "both saturated reports cpu")]
        #[test_case(3600.0, 14e9, None ; "just below threshold")]
        fn saturation(cpu: f64, memory: f64, expected: Option<&str>) {
            let usage = ResourceQuantities::new(cpu, memory);
            let detection = classify_node(&healthy_node(), Some(&usage), true);
            match expected {
                Some(resource) => {
                    let detection = detection.unwrap();
                    assert_eq!(detection.kind, ProblemKind::NodeResourcePressure);
                    assert!(detection.message.contains(&format!("100% {resource} usage")));
                }
                None => assert!(detection.is_none()),
            }
        }

        #[test]
        fn saturation_uses_allocatable() {
            // 3700 of 4000 capacity is 92.5%, but 3700 of 3800 allocatable is 97%.
            let usage = ResourceQuantities::new(3700.0, 0.0);
            let detection = classify_node(&healthy_node(), Some(&usage), true).unwrap();
            assert!(detection.message.contains("cpu"));
        }

        #[test]
        fn zero_allocatable_is_not_saturated() {
            let node = NodeSnapshot::new("n");
            let usage = ResourceQuantities::new(500.0, 1e9);
            assert!(classify_node(&node, Some(&usage), true).is_none());
        }
    }

    mod pod_status_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn phase_is_default_status() {
            assert_eq!(pod_status(&PodSnapshot::new("ns", "p", "Pending")), "Pending");
        }

        #[test]
        fn pod_reason_overrides_phase() {
            let pod = PodSnapshot::new("ns", "p", "Failed").with_reason("Evicted");
            assert_eq!(pod_status(&pod), "Evicted");
        }

        #[test]
        fn init_container_killed_by_signal() {
            let pod = PodSnapshot::new("ns", "p", "Pending").with_init_container(
                ContainerStatusSnapshot::terminated("init", TerminatedState::new(1).with_signal(9)),
            );
            assert_eq!(pod_status(&pod), "Init:Signal:9");
        }

        #[test]
        fn init_container_exit_code() {
            let pod = PodSnapshot::new("ns", "p", "Pending").with_init_container(
                ContainerStatusSnapshot::terminated("init", TerminatedState::new(2)),
            );
            assert_eq!(pod_status(&pod), "Init:ExitCode:2");
        }

        #[test]
        fn init_container_terminated_reason() {
            let pod = PodSnapshot::new("ns", "p", "Pending").with_init_container(
                ContainerStatusSnapshot::terminated("init", TerminatedState::new(1).with_reason("Error")),
            );
            assert_eq!(pod_status(&pod), "Init:Error");
        }

        #[test]
        fn init_container_waiting_reason() {
            let pod = PodSnapshot::new("ns", "p", "Pending")
                .with_init_container(ContainerStatusSnapshot::waiting("init", "CrashLoopBackOff"));
            assert_eq!(pod_status(&pod), "Init:CrashLoopBackOff");
        }

        #[test]
        fn init_container_progress() {
            let pod = PodSnapshot::new("ns", "p", "Pending")
                .with_init_container(ContainerStatusSnapshot::terminated("a", TerminatedState::new(0)))
                .with_init_container(ContainerStatusSnapshot::waiting("b", "PodInitializing"))
                .with_init_container(ContainerStatusSnapshot::waiting("c", ""));
            assert_eq!(pod_status(&pod), "Init:1/3");
        }

        #[test]
        fn running_ready_container_overrides_completed() {
            let pod = PodSnapshot::new("ns", "p", "Running")
                .with_init_container(ContainerStatusSnapshot::terminated("init", TerminatedState::new(0)))
                .with_container(ContainerStatusSnapshot::terminated(
                    "job",
                    TerminatedState::new(0).with_reason("Completed"),
                ))
                .with_container(ContainerStatusSnapshot::running("sidecar", true));
            assert_eq!(pod_status(&pod), "Running");
        }

        #[test]
        fn completed_without_running_container() {
            let pod = PodSnapshot::new("ns", "p", "Succeeded").with_container(
                ContainerStatusSnapshot::terminated("job", TerminatedState::new(0).with_reason("Completed")),
            );
            assert_eq!(pod_status(&pod), "Completed");
        }

        #[test]
        fn first_container_wins_reverse_scan() {
            let pod = PodSnapshot::new("ns", "p", "Running")
                .with_container(ContainerStatusSnapshot::waiting("app", "CrashLoopBackOff"))
                .with_container(ContainerStatusSnapshot::waiting("sidecar", "ContainerCreating"));
            assert_eq!(pod_status(&pod), "CrashLoopBackOff");
        }

        #[test_case(TerminatedState::new(137).with_signal(9), "Signal:9")]
        #[test_case(TerminatedState::new(3), "ExitCode:3")]
        fn synthesized_container_status(state: TerminatedState, expected: &str) {
            let pod = PodSnapshot::new("ns", "p", "Running")
                .with_container(ContainerStatusSnapshot::terminated("app", state));
            assert_eq!(pod_status(&pod), expected);
        }

        #[test]
        fn deleting_pod_is_terminating() {
            let pod = PodSnapshot::new("ns", "p", "Running")
                .with_container(ContainerStatusSnapshot::running("app", true))
                .deleted_at(now());
            assert_eq!(pod_status(&pod), "Terminating");
        }

        #[test]
        fn deleting_pod_on_lost_node_is_unknown() {
            let pod = PodSnapshot::new("ns", "p", "Running")
                .with_reason(NODE_UNREACHABLE_POD_REASON)
                .deleted_at(now());
            assert_eq!(pod_status(&pod), "Unknown");
        }
    }

    mod pod_classify_tests {
        use super::*;

        fn running_pod() -> PodSnapshot {
            PodSnapshot::new("default", "web-0", "Running")
                .with_container(ContainerStatusSnapshot::running("app", true))
        }

        #[test]
        fn healthy_running_pod() {
            assert!(classify_pod(&running_pod(), now()).is_none());
        }

        #[test]
        fn crash_loop_is_critical() {
            let pod = PodSnapshot::new("default", "web-0", "Running")
                .with_container(ContainerStatusSnapshot::waiting("app", "CrashLoopBackOff"));
            let detection = classify_pod(&pod, now()).unwrap();
            assert_eq!(detection.kind, ProblemKind::PodCriticalStatus);
            assert_eq!(
                detection.message,
                "Pod 'default/web-0' has critical status 'CrashLoopBackOff'"
            );
        }

        #[test]
        fn every_critical_status_is_critical() {
            for status in CRITICAL_STATUSES {
                let pod = PodSnapshot::new("ns", "p", "Failed").with_reason(status);
                let detection = classify_pod(&pod, now()).unwrap();
                assert_eq!(detection.kind, ProblemKind::PodCriticalStatus, "{status}");
            }
        }

        #[test]
        fn container_creating_is_pending() {
            let pod = PodSnapshot::new("default", "web-0", "Pending")
                .with_container(ContainerStatusSnapshot::waiting("app", "ContainerCreating"));
            let detection = classify_pod(&pod, now()).unwrap();
            assert_eq!(detection.kind, ProblemKind::PodPending);
            assert!(detection.message.contains("'ContainerCreating'"));
        }

        #[test]
        fn recent_failed_termination_is_restart() {
            let pod = PodSnapshot::new("default", "web-0", "Running").with_container(
                ContainerStatusSnapshot::running("app", true).with_last_terminated(
                    TerminatedState::new(137)
                        .with_reason("OOMKilled")
                        .finished_at(now() - Duration::seconds(120)),
                ),
            );
            let detection = classify_pod(&pod, now()).unwrap();
            assert_eq!(detection.kind, ProblemKind::PodRestart);
            assert_eq!(
                detection.message,
                "Pod 'default/web-0' has restarted 120 seconds ago due to 'OOMKilled' with exit code '137'"
            );
        }

        #[test]
        fn old_termination_is_ignored() {
            let pod = PodSnapshot::new("default", "web-0", "Running").with_container(
                ContainerStatusSnapshot::running("app", true).with_last_terminated(
                    TerminatedState::new(1).finished_at(now() - Duration::minutes(61)),
                ),
            );
            assert!(classify_pod(&pod, now()).is_none());
        }

        #[test]
        fn clean_exit_is_not_a_restart() {
            let pod = PodSnapshot::new("default", "web-0", "Running").with_container(
                ContainerStatusSnapshot::running("app", true).with_last_terminated(
                    TerminatedState::new(0).finished_at(now() - Duration::seconds(5)),
                ),
            );
            assert!(classify_pod(&pod, now()).is_none());
        }

        #[test]
        fn first_restarted_container_is_reported() {
            let pod = PodSnapshot::new("default", "web-0", "Running")
                .with_container(ContainerStatusSnapshot::running("a", true).with_last_terminated(
                    TerminatedState::new(2).with_reason("Error").finished_at(now() - Duration::seconds(10)),
                ))
                .with_container(ContainerStatusSnapshot::running("b", true).with_last_terminated(
                    TerminatedState::new(137).with_reason("OOMKilled").finished_at(now()),
                ));
            let detection = classify_pod(&pod, now()).unwrap();
            assert!(detection.message.contains("'Error'"));
        }
    }
}
