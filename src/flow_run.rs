//! Flow-run orchestration: turns a persisted [`Flow`] definition into a
//! submitted workflow plus its [`StepRun`] rows, and reconciles both back
//! against engine status (§4.3 C3b, §4.5 "Step-run phase reconciliation").
//!
//! Sits one layer above [`crate::manifest::flow`] (pure synthesis) and
//! [`crate::store::queries`] (pure persistence): this module is the
//! "what do we do with a Flow" glue the HTTP layer calls into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::argo;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::manifest::flow::{self, FlowEdge, FlowManifestInput, FlowStepInput};
use crate::phase;
use crate::pvc;
use crate::store::queries::{self, Flow, FlowRun, StepRun};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDef {
    pub id: String,
    pub name: String,
    pub python_code: String,
    #[serde(default)]
    pub python_deps: Option<String>,
    #[serde(default)]
    pub requirements_file: Option<String>,
    #[serde(default)]
    pub system_deps: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowDefinition {
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

pub fn parse_definition(value: &Value) -> Result<FlowDefinition> {
    serde_json::from_value(value.clone()).map_err(Error::Serialization)
}

fn manifest_input(def: &FlowDefinition, use_cache: bool) -> FlowManifestInput {
    FlowManifestInput {
        steps: def
            .steps
            .iter()
            .map(|s| FlowStepInput {
                id: s.id.clone(),
                name: s.name.clone(),
                python_code: s.python_code.clone(),
                python_deps: s.python_deps.clone(),
                requirements_file: s.requirements_file.clone(),
                system_deps: s.system_deps.clone(),
            })
            .collect(),
        edges: def
            .edges
            .iter()
            .map(|e| FlowEdge {
                source: e.source.clone(),
                target: e.target.clone(),
            })
            .collect(),
        use_cache,
    }
}

/// Validate and synthesize the manifest without submitting it — backs the
/// preview-flow-manifest HTTP operation.
pub fn preview_manifest(ctx: &Context, def: &FlowDefinition, use_cache: bool) -> Result<Value> {
    let manifest = flow::build(&ctx.config, &manifest_input(def, use_cache))?;
    Ok(serde_json::to_value(manifest)?)
}

/// Reject before any manifest is synthesized or submitted if the flow's
/// latest run is still active, so a conflict never leaves an orphaned
/// workflow behind — [`queries::start_flow_run`]'s own check still guards
/// the race between two concurrent submits.
async fn reject_if_active(ctx: &Context, flow_id: &str) -> Result<()> {
    if let Some(phase) = queries::latest_flow_run_phase(&ctx.db, flow_id).await? {
        if queries::is_active_phase(&phase) {
            return Err(Error::Conflict(format!(
                "flow {flow_id} already has an active run in phase {phase}"
            )));
        }
    }
    Ok(())
}

/// Submit a flow's full DAG as one workflow, record the FlowRun, and create
/// one StepRun per declared step with an unresolved `workflow_node_id` —
/// reconciliation fills it in on first poll.
pub async fn submit(ctx: &Context, flow: &Flow, use_cache: bool) -> Result<FlowRun> {
    let def = parse_definition(&flow.definition)?;
    reject_if_active(ctx, &flow.id).await?;
    pvc::ensure_required_pvcs_bound(&ctx.client, &ctx.namespace, &ctx.config, use_cache).await?;

    let manifest = flow::build(&ctx.config, &manifest_input(&def, use_cache))?;
    let body = serde_json::to_value(manifest)?;
    let workflow_id = argo::submit_workflow(&ctx.client, &ctx.namespace, body).await?;

    let flow_run = queries::start_flow_run(&ctx.db, &flow.id, &workflow_id).await?;
    for step in &def.steps {
        queries::create_step_run(&ctx.db, flow_run.id, &step.id, "").await?;
    }

    ctx.metrics.flow_runs_started.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(flow_run)
}

/// Re-run a single step in isolation as its own one-step, zero-edge flow
/// run under the same Flow — the synthesizer and store paths are identical
/// to a full-DAG submission, just with the step set narrowed to one.
pub async fn submit_step(ctx: &Context, flow: &Flow, step_id: &str, use_cache: bool) -> Result<FlowRun> {
    let def = parse_definition(&flow.definition)?;
    let step = def
        .steps
        .iter()
        .find(|s| s.id == step_id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("step {step_id} not declared in flow {}", flow.id)))?;

    let single = FlowDefinition {
        steps: vec![step],
        edges: vec![],
    };
    reject_if_active(ctx, &flow.id).await?;
    pvc::ensure_required_pvcs_bound(&ctx.client, &ctx.namespace, &ctx.config, use_cache).await?;
    let manifest = flow::build(&ctx.config, &manifest_input(&single, use_cache))?;
    let body = serde_json::to_value(manifest)?;
    let workflow_id = argo::submit_workflow(&ctx.client, &ctx.namespace, body).await?;

    let flow_run = queries::start_flow_run(&ctx.db, &flow.id, &workflow_id).await?;
    queries::create_step_run(&ctx.db, flow_run.id, step_id, "").await?;
    Ok(flow_run)
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRunView {
    pub flow_run: FlowRun,
    pub steps: Vec<StepRun>,
}

/// Resolve the FlowRun's phase and every child StepRun's phase against
/// current engine status, persisting any corrections (§4.5).
pub async fn reconcile(ctx: &Context, flow_run: &FlowRun) -> Result<FlowRunView> {
    let status = argo::get_workflow_status(&ctx.client, &ctx.namespace, &flow_run.workflow_id).await?;
    let resolved = phase::resolve(&status);

    if resolved != flow_run.phase {
        queries::update_flow_run_phase(
            &ctx.db,
            flow_run.id,
            &resolved,
            parse_ts(status.started_at.as_deref()),
            parse_ts(status.finished_at.as_deref()),
        )
        .await?;
    }

    let mut steps = queries::list_step_runs(&ctx.db, flow_run.id).await?;
    for step in &mut steps {
        let Some(node_key) = resolve_node_for_step(&status, &flow_run.workflow_id, step) else {
            continue;
        };

        if step.workflow_node_id != node_key {
            queries::update_step_workflow_node_id(&ctx.db, step.id, &node_key).await?;
            step.workflow_node_id = node_key.clone();
        }

        let node = &status.nodes[&node_key];
        let step_phase = match node.phase.as_str() {
            "Failed" | "Error" => "Failed".to_string(),
            "" => "Pending".to_string(),
            other => other.to_string(),
        };
        if step.phase != step_phase {
            queries::update_step_run_phase(&ctx.db, step.id, &step_phase, None, None).await?;
            step.phase = step_phase;
        }
    }

    let flow_run = queries::get_flow_run(&ctx.db, &flow_run.flow_id, Some(flow_run.run_number)).await?;
    Ok(FlowRunView { flow_run, steps })
}

/// Three strategies tried in order (§4.5 "Step-run phase reconciliation"):
/// exact match of the stored node id, `<workflow-id>.<step-id>`, then a
/// scan for any node whose template/display name or key suffix is the step id.
fn resolve_node_for_step(
    status: &argo::WorkflowStatus,
    workflow_id: &str,
    step: &StepRun,
) -> Option<String> {
    if !step.workflow_node_id.is_empty() && status.nodes.contains_key(&step.workflow_node_id) {
        return Some(step.workflow_node_id.clone());
    }

    let dotted = format!("{workflow_id}.{}", step.step_id);
    if status.nodes.contains_key(&dotted) {
        return Some(dotted);
    }

    for (key, node) in &status.nodes {
        let matches = node.template_name.as_deref() == Some(step.step_id.as_str())
            || node.display_name.as_deref() == Some(step.step_id.as_str())
            || key == &step.step_id
            || key.ends_with(&format!(".{}", step.step_id));
        if matches {
            return Some(key.clone());
        }
    }

    None
}

fn parse_ts(raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn step_run(id: i64, step_id: &str, node_id: &str) -> StepRun {
        StepRun {
            id,
            flow_run_id: 1,
            step_id: step_id.to_string(),
            workflow_node_id: node_id.to_string(),
            phase: "Pending".to_string(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn exact_node_id_match_wins_first() {
        let mut status = argo::WorkflowStatus::default();
        status.nodes.insert("wf-1-123".to_string(), argo::NodeStatus::default());
        let step = step_run(1, "fetch", "wf-1-123");
        assert_eq!(resolve_node_for_step(&status, "wf-1", &step), Some("wf-1-123".to_string()));
    }

    #[test]
    fn falls_back_to_template_name_scan() {
        let mut status = argo::WorkflowStatus::default();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "wf-1-456".to_string(),
            argo::NodeStatus {
                template_name: Some("fetch".to_string()),
                ..Default::default()
            },
        );
        status.nodes = nodes;
        let step = step_run(1, "fetch", "");
        assert_eq!(resolve_node_for_step(&status, "wf-1", &step), Some("wf-1-456".to_string()));
    }

    #[test]
    fn no_match_returns_none() {
        let status = argo::WorkflowStatus::default();
        let step = step_run(1, "fetch", "");
        assert!(resolve_node_for_step(&status, "wf-1", &step).is_none());
    }

    #[test]
    fn definition_parses_steps_and_edges() {
        let value = serde_json::json!({
            "steps": [{"id": "a", "name": "A", "python_code": "print(1)"}],
            "edges": []
        });
        let def = parse_definition(&value).unwrap();
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.steps[0].id, "a");
    }
}
