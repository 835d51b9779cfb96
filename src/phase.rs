//! C1 — Phase Resolver.
//!
//! Derives a single authoritative phase from a workflow status document by
//! reconciling the top-level phase with per-node pod phases: the engine's
//! top-level phase lags per-pod state, so this presents a smoothed view
//! that never regresses out of a terminal phase and never reports
//! `Running` when no pod is alive.

use crate::argo::WorkflowStatus;

pub const PENDING: &str = "Pending";
pub const RUNNING: &str = "Running";
pub const SUCCEEDED: &str = "Succeeded";
pub const FAILED: &str = "Failed";
pub const ERROR: &str = "Error";

fn is_terminal(phase: &str) -> bool {
    matches!(phase, "Succeeded" | "Failed" | "Error" | "Cancelled")
}

fn is_pod_node(node_type: &str) -> bool {
    node_type == "Pod"
}

/// Resolve a single phase from a workflow status document.
///
/// Idempotent: applying it twice to the same status yields the same
/// result, since it is a pure function of `status`.
pub fn resolve(status: &WorkflowStatus) -> String {
    let top = status.phase.trim();

    if top.is_empty() {
        return PENDING.to_string();
    }

    if is_terminal(top) {
        return top.to_string();
    }

    let pod_phases: Vec<&str> = status
        .nodes
        .values()
        .filter(|n| is_pod_node(&n.node_type))
        .map(|n| n.phase.as_str())
        .collect();

    match top {
        RUNNING => {
            if pod_phases.iter().any(|p| *p == RUNNING) {
                return RUNNING.to_string();
            }
            let any_pending = pod_phases.iter().any(|p| *p == PENDING);
            let any_succeeded = pod_phases.iter().any(|p| *p == SUCCEEDED);
            if !any_pending && any_succeeded {
                // Transitional: engine hasn't caught up yet.
                return RUNNING.to_string();
            }
            if pod_phases.is_empty() || pod_phases.iter().all(|p| *p == PENDING) {
                return PENDING.to_string();
            }
            RUNNING.to_string()
        }
        PENDING => {
            if pod_phases.iter().any(|p| *p == RUNNING) {
                RUNNING.to_string()
            } else {
                PENDING.to_string()
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argo::NodeStatus;
    use std::collections::BTreeMap;

    fn node(node_type: &str, phase: &str) -> NodeStatus {
        NodeStatus {
            node_type: node_type.to_string(),
            phase: phase.to_string(),
            display_name: None,
            id: None,
            template_name: None,
        }
    }

    #[test]
    fn empty_status_is_pending() {
        let status = WorkflowStatus::default();
        assert_eq!(resolve(&status), PENDING);
    }

    #[test]
    fn empty_top_level_is_pending() {
        let status = WorkflowStatus {
            phase: "".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve(&status), PENDING);
    }

    #[test]
    fn terminal_top_level_returned_as_is() {
        for p in ["Succeeded", "Failed", "Error"] {
            let status = WorkflowStatus {
                phase: p.to_string(),
                ..Default::default()
            };
            assert_eq!(resolve(&status), p);
        }
    }

    #[test]
    fn running_with_running_pod_stays_running() {
        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node("Pod", "Running"));
        let status = WorkflowStatus {
            phase: RUNNING.to_string(),
            nodes,
            ..Default::default()
        };
        assert_eq!(resolve(&status), RUNNING);
    }

    #[test]
    fn running_with_zero_pod_nodes_is_pending() {
        let status = WorkflowStatus {
            phase: RUNNING.to_string(),
            ..Default::default()
        };
        assert_eq!(resolve(&status), PENDING);
    }

    #[test]
    fn running_all_pods_succeeded_is_transitional_running() {
        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node("Pod", "Succeeded"));
        nodes.insert("n2".to_string(), node("Pod", "Succeeded"));
        let status = WorkflowStatus {
            phase: RUNNING.to_string(),
            nodes,
            ..Default::default()
        };
        assert_eq!(resolve(&status), RUNNING);
    }

    #[test]
    fn running_only_pending_pods_is_pending() {
        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node("Pod", "Pending"));
        let status = WorkflowStatus {
            phase: RUNNING.to_string(),
            nodes,
            ..Default::default()
        };
        assert_eq!(resolve(&status), PENDING);
    }

    #[test]
    fn pending_top_level_with_running_pod_becomes_running() {
        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node("Pod", "Running"));
        let status = WorkflowStatus {
            phase: PENDING.to_string(),
            nodes,
            ..Default::default()
        };
        assert_eq!(resolve(&status), RUNNING);
    }

    #[test]
    fn resolver_is_idempotent() {
        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node("Pod", "Succeeded"));
        let status = WorkflowStatus {
            phase: RUNNING.to_string(),
            nodes,
            ..Default::default()
        };
        let once = resolve(&status);
        let twice = resolve(&status);
        assert_eq!(once, twice);
    }
}
