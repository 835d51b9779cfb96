//! Task/Run HTTP operations: submit-task, run-task, list-tasks, get-task,
//! list-run-logs, cancel-task, purge-task (§6).

use std::sync::atomic::Ordering;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::argo;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::ids;
use crate::logs::pull::pull_task_logs;
use crate::manifest::task::{self, TaskManifestInput};
use crate::pvc;
use crate::store::queries::{self, Task};

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub python_code: String,
    #[serde(default)]
    pub python_deps: Option<String>,
    #[serde(default)]
    pub requirements_file: Option<String>,
    #[serde(default)]
    pub system_deps: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunTaskRequest {
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_number: i64,
    pub workflow_id: String,
    pub phase: String,
}

pub async fn submit_task(
    State(ctx): State<Context>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Json<Task>> {
    let id = ids::generate("task");
    let task = queries::upsert_task(
        &ctx.db,
        &id,
        &req.python_code,
        req.python_deps.as_deref(),
        req.requirements_file.as_deref(),
        req.system_deps.as_deref(),
    )
    .await?;
    ctx.metrics.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    Ok(Json(task))
}

pub async fn list_tasks(State(ctx): State<Context>) -> Result<Json<Vec<Task>>> {
    Ok(Json(queries::list_tasks(&ctx.db).await?))
}

pub async fn get_task(State(ctx): State<Context>, Path(id): Path<String>) -> Result<Json<Task>> {
    Ok(Json(queries::get_task(&ctx.db, &id).await?))
}

pub async fn purge_task(State(ctx): State<Context>, Path(id): Path<String>) -> Result<()> {
    // Best-effort: delete every known workflow for this task's runs, tolerating
    // 404 (§5 "Purge... deletes the workflow resources (best-effort; 404 is
    // success) and then the owning Task/Flow and all children in the store").
    if let Ok(runs) = queries::list_runs(&ctx.db, &id).await {
        for run in runs {
            let _ = argo::delete_workflow(&ctx.client, &ctx.namespace, &run.workflow_id).await;
        }
    }
    queries::delete_task(&ctx.db, &id).await
}

pub async fn run_task(
    State(ctx): State<Context>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RunResponse>> {
    let use_cache = if body.is_empty() {
        true
    } else {
        serde_json::from_slice::<RunTaskRequest>(&body)
            .map(|r| r.use_cache)
            .unwrap_or(true)
    };
    let task = queries::get_task(&ctx.db, &id).await?;

    if let Some(phase) = queries::latest_run_phase(&ctx.db, &id).await? {
        if queries::is_active_phase(&phase) {
            return Err(Error::Conflict(format!(
                "task {id} already has an active run in phase {phase}"
            )));
        }
    }

    pvc::ensure_required_pvcs_bound(&ctx.client, &ctx.namespace, &ctx.config, use_cache).await?;

    let manifest = task::build(
        &ctx.config,
        &TaskManifestInput {
            python_code: task.python_code.clone(),
            python_deps: task.python_deps.clone(),
            requirements_file: task.requirements_file.clone(),
            system_deps: task.system_deps.clone(),
            use_cache,
            task_id: task.id.clone(),
        },
    )?;

    let body = serde_json::to_value(manifest)?;
    let workflow_id = argo::submit_workflow(&ctx.client, &ctx.namespace, body).await?;
    let run = queries::start_run(&ctx.db, &task, &workflow_id).await?;

    ctx.metrics.runs_started.fetch_add(1, Ordering::Relaxed);
    Ok(Json(RunResponse {
        run_number: run.run_number,
        workflow_id: run.workflow_id,
        phase: run.phase,
    }))
}

pub async fn cancel_task(State(ctx): State<Context>, Path(id): Path<String>) -> Result<()> {
    let run = queries::get_run(&ctx.db, &id, None).await?;
    argo::delete_workflow(&ctx.client, &ctx.namespace, &run.workflow_id).await
}

pub async fn run_logs(
    State(ctx): State<Context>,
    Path((id, run_number)): Path<(String, i64)>,
) -> Result<Json<crate::logs::PullResult>> {
    if run_number <= 0 {
        return Err(Error::Validation("run_number must be positive".to_string()));
    }
    Ok(Json(pull_task_logs(&ctx, &id, Some(run_number)).await?))
}
