//! Push algorithm (§4.5): a ~1s poll loop emitting frames over a channel.
//!
//! Decoupled from the websocket transport itself (see `http::ws`) so the
//! polling logic can be driven by any sink.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tracing::debug;

use crate::argo;
use crate::context::Context;
use crate::phase;
use crate::store::queries;

use super::pull::{fetch_engine_logs, pull_task_logs};
use super::{LogEntry, PullResult};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushFrame {
    Logs {
        data: Vec<LogEntry>,
        #[serde(rename = "workflow_phase")]
        workflow_phase: String,
    },
    Complete {
        #[serde(rename = "workflow_phase")]
        workflow_phase: String,
    },
    Error {
        message: String,
    },
}

fn canonical_hash(logs: &[LogEntry]) -> u64 {
    let mut sorted: Vec<&LogEntry> = logs.iter().collect();
    sorted.sort_by(|a, b| (a.node.as_str(), a.pod.as_str()).cmp(&(b.node.as_str(), b.pod.as_str())));
    let mut hasher = DefaultHasher::new();
    for entry in sorted {
        entry.node.hash(&mut hasher);
        entry.pod.hash(&mut hasher);
        entry.phase.hash(&mut hasher);
        entry.logs.hash(&mut hasher);
    }
    hasher.finish()
}

fn frame_from_pull(result: &PullResult) -> PushFrame {
    PushFrame::Logs {
        data: result.logs.clone(),
        workflow_phase: result.phase.clone(),
    }
}

/// Drive the push stream for `task_id` until the workflow reaches a
/// terminal phase, the channel closes (client disconnected), or no run
/// exists at all. Frames are only emitted when the phase or log set
/// changed, per step 3; client-closed sends end the loop without error.
pub async fn stream_task_logs(ctx: Context, task_id: String, tx: Sender<PushFrame>) {
    let poll_interval = Duration::from_millis(ctx.config.log_pipeline.poll_interval_ms);

    let run = match queries::get_run(&ctx.db, &task_id, None).await {
        Ok(run) => run,
        Err(e) => {
            let _ = tx
                .send(PushFrame::Error {
                    message: format!("no runs found for task {task_id}: {e}"),
                })
                .await;
            return;
        }
    };

    let mut last_hash: Option<u64> = None;
    let mut last_phase: Option<String> = None;

    loop {
        let result = match pull_task_logs(&ctx, &task_id, Some(run.run_number)).await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(PushFrame::Error { message: e.to_string() }).await;
                return;
            }
        };

        let hash = canonical_hash(&result.logs);
        let logs_changed = last_hash != Some(hash);
        let phase_changed = last_phase.as_deref() != Some(result.phase.as_str());

        if logs_changed || phase_changed {
            last_hash = Some(hash);
            last_phase = Some(result.phase.clone());
            if tx.send(frame_from_pull(&result)).await.is_err() {
                debug!(task_id, "push stream receiver dropped, stopping");
                return;
            }
        }

        if is_terminal(&result.phase) {
            if let Ok(status) = argo::get_workflow_status(&ctx.client, &ctx.namespace, &run.workflow_id).await {
                let final_logs = fetch_engine_logs(&ctx, &run.workflow_id, &status).await;
                if !final_logs.is_empty() {
                    for entry in &final_logs {
                        let _ = queries::upsert_log(
                            &ctx.db,
                            run.id,
                            &entry.node,
                            &entry.pod,
                            &entry.phase,
                            &entry.logs,
                        )
                        .await;
                    }
                    let resolved = phase::resolve(&status);
                    let _ = tx
                        .send(PushFrame::Logs {
                            data: final_logs,
                            workflow_phase: resolved,
                        })
                        .await;
                }
            }

            let _ = tx
                .send(PushFrame::Complete {
                    workflow_phase: result.phase,
                })
                .await;
            return;
        }

        sleep(poll_interval).await;
    }
}

fn is_terminal(phase: &str) -> bool {
    matches!(phase, "Succeeded" | "Failed" | "Error" | "Cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: &str, pod: &str, phase: &str, logs: &str) -> LogEntry {
        LogEntry {
            node: node.to_string(),
            pod: pod.to_string(),
            phase: phase.to_string(),
            logs: logs.to_string(),
        }
    }

    #[test]
    fn identical_log_sets_hash_equal_regardless_of_order() {
        let a = vec![entry("n1", "p1", "Running", "x"), entry("n2", "p2", "Running", "y")];
        let b = vec![entry("n2", "p2", "Running", "y"), entry("n1", "p1", "Running", "x")];
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn changed_log_body_changes_hash() {
        let a = vec![entry("n1", "p1", "Running", "x")];
        let b = vec![entry("n1", "p1", "Running", "x-changed")];
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn terminal_phases_are_recognized() {
        for p in ["Succeeded", "Failed", "Error", "Cancelled"] {
            assert!(is_terminal(p));
        }
        assert!(!is_terminal("Running"));
        assert!(!is_terminal("Pending"));
    }
}
