//! Flow/FlowRun HTTP operations: create-flow, list-flows, get-flow,
//! update-flow, delete-flow, run-flow, run-step, list-flow-runs,
//! get-flow-run, get-flow-run-logs, get-flow-run-manifest,
//! preview-flow-manifest (§6).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::Result;
use crate::flow_run::{self, FlowDefinition, FlowRunView};
use crate::ids;
use crate::store::queries::{self, Flow, StepLogRecord};

#[derive(Debug, Deserialize)]
pub struct CreateFlowRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub definition: FlowDefinition,
}

pub async fn create_flow(
    State(ctx): State<Context>,
    Json(req): Json<CreateFlowRequest>,
) -> Result<Json<Flow>> {
    let id = ids::generate("flow");
    let definition = serde_json::to_value(&req.definition)?;
    let flow = queries::upsert_flow(&ctx.db, &id, &req.name, req.description.as_deref(), &definition).await?;
    ctx.metrics.flows_submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(Json(flow))
}

pub async fn list_flows(State(ctx): State<Context>) -> Result<Json<Vec<Flow>>> {
    Ok(Json(queries::list_flows(&ctx.db).await?))
}

pub async fn get_flow(State(ctx): State<Context>, Path(id): Path<String>) -> Result<Json<Flow>> {
    Ok(Json(queries::get_flow(&ctx.db, &id).await?))
}

pub async fn update_flow(
    State(ctx): State<Context>,
    Path(id): Path<String>,
    Json(req): Json<CreateFlowRequest>,
) -> Result<Json<Flow>> {
    let existing = queries::get_flow(&ctx.db, &id).await?;
    let definition = serde_json::to_value(&req.definition)?;
    let description = req.description.or(existing.description);
    Ok(Json(
        queries::upsert_flow(&ctx.db, &id, &req.name, description.as_deref(), &definition).await?,
    ))
}

pub async fn delete_flow(State(ctx): State<Context>, Path(id): Path<String>) -> Result<()> {
    if let Ok(runs) = queries::list_flow_runs(&ctx.db, &id).await {
        for run in runs {
            let _ = crate::argo::delete_workflow(&ctx.client, &ctx.namespace, &run.workflow_id).await;
        }
    }
    queries::delete_flow(&ctx.db, &id).await
}

#[derive(Debug, Deserialize)]
pub struct RunFlowRequest {
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

pub async fn run_flow(
    State(ctx): State<Context>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<queries::FlowRun>> {
    let use_cache = parse_use_cache(&body);
    let flow = queries::get_flow(&ctx.db, &id).await?;
    Ok(Json(flow_run::submit(&ctx, &flow, use_cache).await?))
}

pub async fn run_step(
    State(ctx): State<Context>,
    Path((id, _run_number, step_id)): Path<(String, i64, String)>,
    body: axum::body::Bytes,
) -> Result<Json<queries::FlowRun>> {
    let use_cache = parse_use_cache(&body);
    let flow = queries::get_flow(&ctx.db, &id).await?;
    Ok(Json(flow_run::submit_step(&ctx, &flow, &step_id, use_cache).await?))
}

fn parse_use_cache(body: &[u8]) -> bool {
    if body.is_empty() {
        return true;
    }
    serde_json::from_slice::<RunFlowRequest>(body)
        .map(|r| r.use_cache)
        .unwrap_or(true)
}

pub async fn list_flow_runs(
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<Json<Vec<queries::FlowRun>>> {
    Ok(Json(queries::list_flow_runs(&ctx.db, &id).await?))
}

pub async fn get_flow_run(
    State(ctx): State<Context>,
    Path((id, run_number)): Path<(String, i64)>,
) -> Result<Json<FlowRunView>> {
    let run = queries::get_flow_run(&ctx.db, &id, Some(run_number)).await?;
    Ok(Json(flow_run::reconcile(&ctx, &run).await?))
}

#[derive(Debug, Serialize)]
pub struct StepLogsResponse {
    pub step_id: String,
    pub logs: Vec<StepLogRecord>,
}

pub async fn flow_run_logs(
    State(ctx): State<Context>,
    Path((id, run_number)): Path<(String, i64)>,
) -> Result<Json<Vec<StepLogsResponse>>> {
    let run = queries::get_flow_run(&ctx.db, &id, Some(run_number)).await?;
    let view = flow_run::reconcile(&ctx, &run).await?;
    crate::logs::pull::pull_step_logs(&ctx, &view.flow_run, &view.steps).await?;
    let mut out = Vec::with_capacity(view.steps.len());
    for step in view.steps {
        let logs = queries::list_step_logs(&ctx.db, step.id).await?;
        out.push(StepLogsResponse {
            step_id: step.step_id,
            logs,
        });
    }
    Ok(Json(out))
}

pub async fn flow_run_manifest(
    State(ctx): State<Context>,
    Path((id, run_number)): Path<(String, i64)>,
) -> Result<Json<Value>> {
    let run = queries::get_flow_run(&ctx.db, &id, Some(run_number)).await?;
    let obj = crate::argo::workflows_api(&ctx.client, &ctx.namespace)
        .get(&run.workflow_id)
        .await?;
    Ok(Json(serde_json::to_value(&obj)?))
}

#[derive(Debug, Deserialize)]
pub struct PreviewManifestRequest {
    pub definition: FlowDefinition,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

pub async fn preview_flow_manifest(
    State(ctx): State<Context>,
    Json(req): Json<PreviewManifestRequest>,
) -> Result<Json<Value>> {
    Ok(Json(flow_run::preview_manifest(&ctx, &req.definition, req.use_cache)?))
}
