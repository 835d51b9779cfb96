//! Pull algorithm (§4.5) and its engine log-fetch sub-algorithm.

use kube::api::{Api, LogParams};
use tracing::warn;

use crate::argo::{self, WorkflowStatus};
use crate::context::Context;
use crate::error::Result;
use crate::phase;
use crate::store::queries::{self, FlowRun, Run, StepRun};

use super::{LogEntry, LogSource, PullResult};

const POD_INITIALIZING_MARKERS: &[&str] = &["PodInitializing", "waiting to start"];

/// Resolve the target run (latest of the task if `run_number` is absent),
/// reconcile its stored phase against the engine, then return its logs —
/// from the store if any exist, else freshly fetched from the engine and
/// persisted. Engine failure with nothing cached degrades to an empty,
/// tagged result rather than propagating an error (§4.5 step 7).
pub async fn pull_task_logs(
    ctx: &Context,
    task_id: &str,
    run_number: Option<i64>,
) -> Result<PullResult> {
    let run = queries::get_run(&ctx.db, task_id, run_number).await?;
    reconcile_run_phase(ctx, &run).await
}

async fn reconcile_run_phase(ctx: &Context, run: &Run) -> Result<PullResult> {
    let status = match argo::get_workflow_status(&ctx.client, &ctx.namespace, &run.workflow_id).await
    {
        Ok(status) => status,
        Err(e) => {
            let stored = queries::list_logs(&ctx.db, run).await.unwrap_or_default();
            if stored.is_empty() {
                return Ok(PullResult {
                    phase: run.phase.clone(),
                    source: LogSource::Error,
                    logs: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
            return Ok(PullResult {
                phase: run.phase.clone(),
                source: LogSource::Database,
                logs: stored.into_iter().map(entry_from_row).collect(),
                error: None,
            });
        }
    };

    let resolved_phase = phase::resolve(&status);
    if resolved_phase != run.phase {
        queries::update_run_phase(
            &ctx.db,
            run.id,
            &resolved_phase,
            parse_timestamp(status.started_at.as_deref()),
            parse_timestamp(status.finished_at.as_deref()),
        )
        .await?;
    }

    let mut stored = queries::list_logs(&ctx.db, run).await?;

    if status.is_terminal() && stored.iter().any(|l| l.phase != resolved_phase) {
        queries::rewrite_log_phases(&ctx.db, run.id, &resolved_phase).await?;
        for l in &mut stored {
            l.phase = resolved_phase.clone();
        }
    }

    if !stored.is_empty() {
        return Ok(PullResult {
            phase: resolved_phase,
            source: LogSource::Database,
            logs: stored.into_iter().map(entry_from_row).collect(),
            error: None,
        });
    }

    let fresh = fetch_engine_logs(ctx, &run.workflow_id, &status).await;
    queries::persist_fresh_logs(&ctx.db, run.id, &fresh).await?;

    Ok(PullResult {
        phase: resolved_phase,
        source: LogSource::Kubernetes,
        logs: fresh,
        error: None,
    })
}

fn entry_from_row(row: queries::LogRecord) -> LogEntry {
    LogEntry {
        node: row.node_id,
        pod: row.pod_name,
        phase: row.phase,
        logs: row.logs,
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Engine log fetch sub-algorithm (§4.5): for each pod-type node, resolve a
/// pod name, skip pending/initializing pods silently, read the `main`
/// container's tail, and fall back to a synthetic `workflow` record when no
/// pod ever produced logs but the status carries a top-level message.
pub async fn fetch_engine_logs(ctx: &Context, workflow_id: &str, status: &WorkflowStatus) -> Vec<LogEntry> {
    let workflow_phase = phase::resolve(status);
    let pods_api: Api<k8s_openapi::api::core::v1::Pod> = argo::pods_api(&ctx.client, &ctx.namespace);
    let mut entries = Vec::new();

    for (node_id, node) in &status.nodes {
        if node.node_type != "Pod" {
            continue;
        }

        let entry_phase = if matches!(workflow_phase.as_str(), "Succeeded" | "Failed" | "Error") {
            workflow_phase.clone()
        } else if node.phase.is_empty() {
            "Pending".to_string()
        } else {
            node.phase.clone()
        };

        let mut pod_name = node
            .display_name
            .clone()
            .or_else(|| node.id.clone())
            .unwrap_or_else(|| node_id.clone());

        if let Ok(pods) = argo::list_workflow_pods(&ctx.client, &ctx.namespace, workflow_id).await {
            if let Some(p) = pods.first() {
                pod_name = kube::ResourceExt::name_any(p);
                if let Some(actual_phase) = p.status.as_ref().and_then(|s| s.phase.clone()) {
                    if actual_phase == "Pending" {
                        continue;
                    }
                }
            }
        }

        let lp = LogParams {
            container: Some("main".to_string()),
            tail_lines: Some(ctx.config.log_pipeline.tail_lines),
            ..Default::default()
        };

        match pods_api.logs(&pod_name, &lp).await {
            Ok(logs) => entries.push(LogEntry {
                node: node_id.clone(),
                pod: pod_name,
                phase: entry_phase,
                logs,
            }),
            Err(e) => {
                let msg = e.to_string();
                if POD_INITIALIZING_MARKERS.iter().any(|m| msg.contains(m)) {
                    continue;
                }
                warn!(node_id, pod = %pod_name, error = %msg, "failed to fetch pod logs");
                entries.push(LogEntry {
                    node: node_id.clone(),
                    pod: pod_name,
                    phase: entry_phase,
                    logs: format!("Error fetching logs: {msg}"),
                });
            }
        }
    }

    if entries.is_empty() {
        if let Some(message) = &status.message {
            if !message.is_empty() {
                entries.push(LogEntry {
                    node: "workflow".to_string(),
                    pod: "N/A".to_string(),
                    phase: status.phase.clone(),
                    logs: format!("Workflow message: {message}"),
                });
            }
        }
    }

    entries
}

/// Per-step counterpart to [`fetch_engine_logs`]/[`upsert_log`]: for each
/// step with a reconciled `workflow_node_id` naming a pod-type node, read
/// the `main` container tail and persist it to `flow_step_logs`. A step
/// that already has stored logs is left alone — engine failure or a
/// pending node is skipped silently rather than overwriting what exists.
pub async fn pull_step_logs(ctx: &Context, flow_run: &FlowRun, steps: &[StepRun]) -> Result<()> {
    let status = match argo::get_workflow_status(&ctx.client, &ctx.namespace, &flow_run.workflow_id).await
    {
        Ok(status) => status,
        Err(_) => return Ok(()),
    };

    let pods_api: Api<k8s_openapi::api::core::v1::Pod> = argo::pods_api(&ctx.client, &ctx.namespace);

    for step in steps {
        if step.workflow_node_id.is_empty() {
            continue;
        }
        let Some(node) = status.nodes.get(&step.workflow_node_id) else {
            continue;
        };
        if node.node_type != "Pod" {
            continue;
        }
        if !queries::list_step_logs(&ctx.db, step.id).await?.is_empty() {
            continue;
        }

        let mut pod_name = node
            .display_name
            .clone()
            .or_else(|| node.id.clone())
            .unwrap_or_else(|| step.workflow_node_id.clone());

        if let Ok(pods) =
            argo::list_workflow_pods(&ctx.client, &ctx.namespace, &flow_run.workflow_id).await
        {
            if let Some(p) = pods
                .iter()
                .find(|p| kube::ResourceExt::name_any(*p) == pod_name)
            {
                if let Some(actual_phase) = p.status.as_ref().and_then(|s| s.phase.clone()) {
                    if actual_phase == "Pending" {
                        continue;
                    }
                }
                pod_name = kube::ResourceExt::name_any(p);
            }
        }

        let lp = LogParams {
            container: Some("main".to_string()),
            tail_lines: Some(ctx.config.log_pipeline.tail_lines),
            ..Default::default()
        };

        let phase = if node.phase.is_empty() {
            "Pending".to_string()
        } else {
            node.phase.clone()
        };

        match pods_api.logs(&pod_name, &lp).await {
            Ok(logs) => {
                queries::upsert_step_log(&ctx.db, step.id, &step.workflow_node_id, &pod_name, &phase, &logs)
                    .await?;
            }
            Err(e) => {
                let msg = e.to_string();
                if POD_INITIALIZING_MARKERS.iter().any(|m| msg.contains(m)) {
                    continue;
                }
                warn!(step_id = %step.step_id, pod = %pod_name, error = %msg, "failed to fetch step pod logs");
                queries::upsert_step_log(
                    &ctx.db,
                    step.id,
                    &step.workflow_node_id,
                    &pod_name,
                    &phase,
                    &format!("Error fetching logs: {msg}"),
                )
                .await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamp() {
        let parsed = parse_timestamp(Some("2026-01-01T00:00:00Z"));
        assert!(parsed.is_some());
    }

    #[test]
    fn missing_timestamp_parses_to_none() {
        assert!(parse_timestamp(None).is_none());
    }

    #[test]
    fn malformed_timestamp_parses_to_none() {
        assert!(parse_timestamp(Some("not-a-date")).is_none());
    }
}
