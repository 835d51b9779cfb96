//! Typed operations on the entities of §3. Cascade deletes are left to
//! `ON DELETE CASCADE` foreign keys declared in [`super::schema`] rather than
//! app-level relationship navigation — a database-level cascade, not object
//! navigation that might load columns absent under the legacy schema.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Row};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: String,
    pub python_code: String,
    pub python_deps: Option<String>,
    pub requirements_file: Option<String>,
    pub system_deps: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Run {
    pub id: i64,
    pub task_id: String,
    pub workflow_id: String,
    pub run_number: i64,
    pub phase: String,
    /// Absent when read back from a legacy `task_runs` table that never
    /// gained this column (the schema-evolution `ALTER TABLE` failed).
    pub python_code: Option<String>,
    pub python_deps: Option<String>,
    pub requirements_file: Option<String>,
    pub system_deps: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row shape for `task_runs` on a database where the `python_code`
/// schema-evolution step never applied.
#[derive(Debug, FromRow)]
struct LegacyRunRow {
    id: i64,
    task_id: String,
    workflow_id: String,
    run_number: i64,
    phase: String,
    python_deps: Option<String>,
    requirements_file: Option<String>,
    system_deps: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<LegacyRunRow> for Run {
    fn from(row: LegacyRunRow) -> Self {
        Run {
            id: row.id,
            task_id: row.task_id,
            workflow_id: row.workflow_id,
            run_number: row.run_number,
            phase: row.phase,
            python_code: None,
            python_deps: row.python_deps,
            requirements_file: row.requirements_file,
            system_deps: row.system_deps,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub run_id: Option<i64>,
    pub node_id: String,
    pub pod_name: String,
    pub phase: String,
    pub logs: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub definition: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FlowRun {
    pub id: i64,
    pub flow_id: String,
    pub workflow_id: String,
    pub run_number: i64,
    pub phase: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StepRun {
    pub id: i64,
    pub flow_run_id: i64,
    pub step_id: String,
    pub workflow_node_id: String,
    pub phase: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StepLogRecord {
    pub id: i64,
    pub step_run_id: i64,
    pub node_id: String,
    pub pod_name: String,
    pub phase: String,
    pub logs: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed", "Error", "Cancelled"];
const ACTIVE_PHASES: &[&str] = &["Pending", "Running"];

fn is_terminal(phase: &str) -> bool {
    TERMINAL_PHASES.contains(&phase)
}

// ---- Tasks ----------------------------------------------------------------

pub async fn upsert_task(
    pool: &PgPool,
    id: &str,
    python_code: &str,
    python_deps: Option<&str>,
    requirements_file: Option<&str>,
    system_deps: Option<&str>,
) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (id, python_code, python_deps, requirements_file, system_deps)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            python_code = EXCLUDED.python_code,
            python_deps = EXCLUDED.python_deps,
            requirements_file = EXCLUDED.requirements_file,
            system_deps = EXCLUDED.system_deps,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(python_code)
    .bind(python_deps)
    .bind(requirements_file)
    .bind(system_deps)
    .fetch_one(pool)
    .await?;
    Ok(task)
}

pub async fn get_task(pool: &PgPool, id: &str) -> Result<Task> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("task {id} not found")))
}

pub async fn list_tasks(pool: &PgPool) -> Result<Vec<Task>> {
    Ok(sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?)
}

/// Deletes the task; `task_runs`/`task_logs` rows cascade via FK.
pub async fn delete_task(pool: &PgPool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("task {id} not found")));
    }
    Ok(())
}

// ---- Task runs --------------------------------------------------------------

/// Phase of a task's latest run, if any. Callers that synthesize and submit
/// a workflow to the engine should check this *before* doing either, so a
/// conflict never leaves an orphaned workflow behind — [`start_run`]'s own
/// check still guards the race between two concurrent submits.
pub async fn latest_run_phase(pool: &PgPool, task_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT phase FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC LIMIT 1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(phase,)| phase))
}

pub fn is_active_phase(phase: &str) -> bool {
    ACTIVE_PHASES.contains(&phase)
}

/// Monotone run numbering and the at-most-one-active-run invariant are both
/// enforced inside one serializable transaction: the active-run check and
/// the `MAX(run_number)+1` read happen against a snapshot that no
/// concurrent submit for the same task can have mutated by the time this
/// transaction commits, since Postgres aborts one of the two with a
/// serialization failure rather than let both succeed.
pub async fn start_run(
    pool: &PgPool,
    task: &Task,
    workflow_id: &str,
) -> Result<Run> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    let active: Option<(String,)> = sqlx::query_as(
        "SELECT phase FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC LIMIT 1",
    )
    .bind(&task.id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((phase,)) = active {
        if ACTIVE_PHASES.contains(&phase.as_str()) {
            return Err(Error::Conflict(format!(
                "task {} already has an active run in phase {phase}",
                task.id
            )));
        }
    }

    let next_run_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(run_number), 0) + 1 FROM task_runs WHERE task_id = $1",
    )
    .bind(&task.id)
    .fetch_one(&mut *tx)
    .await?;

    let run = sqlx::query_as::<_, Run>(
        r#"
        INSERT INTO task_runs
            (task_id, workflow_id, run_number, phase, python_code, python_deps, requirements_file, system_deps)
        VALUES ($1, $2, $3, 'Pending', $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&task.id)
    .bind(workflow_id)
    .bind(next_run_number)
    .bind(&task.python_code)
    .bind(&task.python_deps)
    .bind(&task.requirements_file)
    .bind(&task.system_deps)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(run)
}

/// Legacy `task_runs` row shape, naming every column except `python_code`.
const LEGACY_RUN_COLUMNS: &str = "id, task_id, workflow_id, run_number, phase, python_deps, \
    requirements_file, system_deps, started_at, finished_at, created_at";

async fn task_runs_has_python_code(pool: &PgPool) -> bool {
    super::schema::has_column(pool, "task_runs", "python_code").await
}

pub async fn get_run(pool: &PgPool, task_id: &str, run_number: Option<i64>) -> Result<Run> {
    let run = if task_runs_has_python_code(pool).await {
        match run_number {
            Some(n) => {
                sqlx::query_as::<_, Run>(
                    "SELECT * FROM task_runs WHERE task_id = $1 AND run_number = $2",
                )
                .bind(task_id)
                .bind(n)
                .fetch_optional(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Run>(
                    "SELECT * FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC LIMIT 1",
                )
                .bind(task_id)
                .fetch_optional(pool)
                .await?
            }
        }
    } else {
        match run_number {
            Some(n) => {
                sqlx::query_as::<_, LegacyRunRow>(&format!(
                    "SELECT {LEGACY_RUN_COLUMNS} FROM task_runs WHERE task_id = $1 AND run_number = $2"
                ))
                .bind(task_id)
                .bind(n)
                .fetch_optional(pool)
                .await?
                .map(Run::from)
            }
            None => {
                sqlx::query_as::<_, LegacyRunRow>(&format!(
                    "SELECT {LEGACY_RUN_COLUMNS} FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC LIMIT 1"
                ))
                .bind(task_id)
                .fetch_optional(pool)
                .await?
                .map(Run::from)
            }
        }
    };
    run.ok_or_else(|| Error::NotFound(format!("no run found for task {task_id}")))
}

pub async fn list_runs(pool: &PgPool, task_id: &str) -> Result<Vec<Run>> {
    if task_runs_has_python_code(pool).await {
        Ok(sqlx::query_as::<_, Run>(
            "SELECT * FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await?)
    } else {
        Ok(sqlx::query_as::<_, LegacyRunRow>(&format!(
            "SELECT {LEGACY_RUN_COLUMNS} FROM task_runs WHERE task_id = $1 ORDER BY run_number DESC"
        ))
        .bind(task_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Run::from)
        .collect())
    }
}

/// Refuses to regress out of a terminal phase (§5 ordering guarantee).
pub async fn update_run_phase(
    pool: &PgPool,
    run_id: i64,
    phase: &str,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let current: Option<(String,)> = sqlx::query_as("SELECT phase FROM task_runs WHERE id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;

    if let Some((current_phase,)) = current {
        if is_terminal(&current_phase) {
            return Ok(());
        }
    }

    sqlx::query(
        "UPDATE task_runs SET phase = $1,
            started_at = COALESCE($2, started_at),
            finished_at = COALESCE($3, finished_at)
         WHERE id = $4",
    )
    .bind(phase)
    .bind(started_at)
    .bind(finished_at)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---- Task logs --------------------------------------------------------------

pub async fn upsert_log(
    pool: &PgPool,
    run_id: i64,
    node_id: &str,
    pod_name: &str,
    phase: &str,
    logs: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO task_logs (run_id, node_id, pod_name, phase, logs)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (run_id, node_id, pod_name) DO UPDATE SET
            phase = EXCLUDED.phase,
            logs = EXCLUDED.logs,
            updated_at = now()
        "#,
    )
    .bind(run_id)
    .bind(node_id)
    .bind(pod_name)
    .bind(phase)
    .bind(logs)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_logs_for_run(pool: &PgPool, run_id: i64) -> Result<Vec<LogRecord>> {
    Ok(sqlx::query_as::<_, LogRecord>(
        "SELECT * FROM task_logs WHERE run_id = $1 ORDER BY node_id, pod_name",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?)
}

async fn task_logs_has_run_id(pool: &PgPool) -> bool {
    super::schema::has_column(pool, "task_logs", "run_id").await
}

/// Dispatches to [`list_logs_legacy`] when `task_logs` has no `run_id`
/// column (the schema-evolution step never applied), else [`list_logs_for_run`].
pub async fn list_logs(pool: &PgPool, run: &Run) -> Result<Vec<LogRecord>> {
    if task_logs_has_run_id(pool).await {
        list_logs_for_run(pool, run.id).await
    } else {
        list_logs_legacy(pool, &run.task_id, &run.workflow_id).await
    }
}

/// Persist freshly-fetched engine logs, one [`upsert_log`] per entry. A
/// legacy `task_logs` table with no `run_id` column cannot receive a
/// current-schema write, so this is a no-op in that case — the caller still
/// returns the fresh entries to the client, just without caching them.
pub async fn persist_fresh_logs(pool: &PgPool, run_id: i64, entries: &[crate::logs::LogEntry]) -> Result<()> {
    if !task_logs_has_run_id(pool).await {
        return Ok(());
    }
    for entry in entries {
        upsert_log(pool, run_id, &entry.node, &entry.pod, &entry.phase, &entry.logs).await?;
    }
    Ok(())
}

/// Legacy fallback: logs keyed by `task_id` with no `run_id`, filtered by a
/// workflow-id substring on `pod_name` so sibling runs' pods aren't mixed in.
pub async fn list_logs_legacy(
    pool: &PgPool,
    task_id: &str,
    workflow_id: &str,
) -> Result<Vec<LogRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT tl.id, tl.run_id, tl.node_id, tl.pod_name, tl.phase, tl.logs, tl.created_at, tl.updated_at
        FROM task_logs tl
        WHERE tl.run_id IS NULL
          AND tl.pod_name LIKE '%' || $1 || '%'
        ORDER BY tl.node_id, tl.pod_name
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    let _ = task_id; // retained for call-site symmetry with the current-schema path
    Ok(rows
        .into_iter()
        .map(|row| LogRecord {
            id: row.get("id"),
            run_id: row.get("run_id"),
            node_id: row.get("node_id"),
            pod_name: row.get("pod_name"),
            phase: row.get("phase"),
            logs: row.get("logs"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

/// Overwrite every stored log's phase for a run — used on terminal
/// transitions (§4.5 "Terminal-phase log-phase rewrite").
pub async fn rewrite_log_phases(pool: &PgPool, run_id: i64, phase: &str) -> Result<()> {
    sqlx::query("UPDATE task_logs SET phase = $1, updated_at = now() WHERE run_id = $2 AND phase != $1")
        .bind(phase)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- Flows ------------------------------------------------------------------

pub async fn upsert_flow(
    pool: &PgPool,
    id: &str,
    name: &str,
    description: Option<&str>,
    definition: &Value,
) -> Result<Flow> {
    let flow = sqlx::query_as::<_, Flow>(
        r#"
        INSERT INTO flows (id, name, description, definition)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            definition = EXCLUDED.definition,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(definition)
    .fetch_one(pool)
    .await?;
    Ok(flow)
}

pub async fn get_flow(pool: &PgPool, id: &str) -> Result<Flow> {
    sqlx::query_as::<_, Flow>("SELECT * FROM flows WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("flow {id} not found")))
}

pub async fn list_flows(pool: &PgPool) -> Result<Vec<Flow>> {
    Ok(sqlx::query_as::<_, Flow>("SELECT * FROM flows ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?)
}

pub async fn delete_flow(pool: &PgPool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM flows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("flow {id} not found")));
    }
    Ok(())
}

// ---- Flow runs / step runs ---------------------------------------------------

/// Phase of a flow's latest run, if any — see [`latest_run_phase`] for why
/// callers check this before submitting to the engine.
pub async fn latest_flow_run_phase(pool: &PgPool, flow_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT phase FROM flow_runs WHERE flow_id = $1 ORDER BY run_number DESC LIMIT 1",
    )
    .bind(flow_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(phase,)| phase))
}

pub async fn start_flow_run(pool: &PgPool, flow_id: &str, workflow_id: &str) -> Result<FlowRun> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    let active: Option<(String,)> = sqlx::query_as(
        "SELECT phase FROM flow_runs WHERE flow_id = $1 ORDER BY run_number DESC LIMIT 1",
    )
    .bind(flow_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((phase,)) = active {
        if ACTIVE_PHASES.contains(&phase.as_str()) {
            return Err(Error::Conflict(format!(
                "flow {flow_id} already has an active run in phase {phase}"
            )));
        }
    }

    let next_run_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(run_number), 0) + 1 FROM flow_runs WHERE flow_id = $1",
    )
    .bind(flow_id)
    .fetch_one(&mut *tx)
    .await?;

    let run = sqlx::query_as::<_, FlowRun>(
        r#"
        INSERT INTO flow_runs (flow_id, workflow_id, run_number, phase)
        VALUES ($1, $2, $3, 'Pending')
        RETURNING *
        "#,
    )
    .bind(flow_id)
    .bind(workflow_id)
    .bind(next_run_number)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(run)
}

pub async fn get_flow_run(pool: &PgPool, flow_id: &str, run_number: Option<i64>) -> Result<FlowRun> {
    let run = match run_number {
        Some(n) => {
            sqlx::query_as::<_, FlowRun>(
                "SELECT * FROM flow_runs WHERE flow_id = $1 AND run_number = $2",
            )
            .bind(flow_id)
            .bind(n)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, FlowRun>(
                "SELECT * FROM flow_runs WHERE flow_id = $1 ORDER BY run_number DESC LIMIT 1",
            )
            .bind(flow_id)
            .fetch_optional(pool)
            .await?
        }
    };
    run.ok_or_else(|| Error::NotFound(format!("no run found for flow {flow_id}")))
}

pub async fn list_flow_runs(pool: &PgPool, flow_id: &str) -> Result<Vec<FlowRun>> {
    Ok(sqlx::query_as::<_, FlowRun>(
        "SELECT * FROM flow_runs WHERE flow_id = $1 ORDER BY run_number DESC",
    )
    .bind(flow_id)
    .fetch_all(pool)
    .await?)
}

pub async fn update_flow_run_phase(
    pool: &PgPool,
    flow_run_id: i64,
    phase: &str,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let current: Option<(String,)> = sqlx::query_as("SELECT phase FROM flow_runs WHERE id = $1")
        .bind(flow_run_id)
        .fetch_optional(pool)
        .await?;
    if let Some((current_phase,)) = current {
        if is_terminal(&current_phase) {
            return Ok(());
        }
    }
    sqlx::query(
        "UPDATE flow_runs SET phase = $1,
            started_at = COALESCE($2, started_at),
            finished_at = COALESCE($3, finished_at)
         WHERE id = $4",
    )
    .bind(phase)
    .bind(started_at)
    .bind(finished_at)
    .bind(flow_run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_step_run(
    pool: &PgPool,
    flow_run_id: i64,
    step_id: &str,
    workflow_node_id: &str,
) -> Result<StepRun> {
    Ok(sqlx::query_as::<_, StepRun>(
        r#"
        INSERT INTO flow_step_runs (flow_run_id, step_id, workflow_node_id, phase)
        VALUES ($1, $2, $3, 'Pending')
        RETURNING *
        "#,
    )
    .bind(flow_run_id)
    .bind(step_id)
    .bind(workflow_node_id)
    .fetch_one(pool)
    .await?)
}

pub async fn list_step_runs(pool: &PgPool, flow_run_id: i64) -> Result<Vec<StepRun>> {
    Ok(sqlx::query_as::<_, StepRun>(
        "SELECT * FROM flow_step_runs WHERE flow_run_id = $1 ORDER BY id",
    )
    .bind(flow_run_id)
    .fetch_all(pool)
    .await?)
}

/// Durable, in-place correction of a step's resolved engine node id (§4.5
/// step-run phase reconciliation) — no transaction wrapper, matching the
/// decision recorded for this open question: later lookups just read the
/// corrected value directly, and a lost race re-derives the same value next
/// poll since resolution is a pure function of the workflow status.
pub async fn update_step_workflow_node_id(
    pool: &PgPool,
    step_run_id: i64,
    workflow_node_id: &str,
) -> Result<()> {
    sqlx::query("UPDATE flow_step_runs SET workflow_node_id = $1 WHERE id = $2")
        .bind(workflow_node_id)
        .bind(step_run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_step_run_phase(
    pool: &PgPool,
    step_run_id: i64,
    phase: &str,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE flow_step_runs SET phase = $1,
            started_at = COALESCE($2, started_at),
            finished_at = COALESCE($3, finished_at)
         WHERE id = $4",
    )
    .bind(phase)
    .bind(started_at)
    .bind(finished_at)
    .bind(step_run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_step_log(
    pool: &PgPool,
    step_run_id: i64,
    node_id: &str,
    pod_name: &str,
    phase: &str,
    logs: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO flow_step_logs (step_run_id, node_id, pod_name, phase, logs)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (step_run_id, node_id, pod_name) DO UPDATE SET
            phase = EXCLUDED.phase,
            logs = EXCLUDED.logs,
            updated_at = now()
        "#,
    )
    .bind(step_run_id)
    .bind(node_id)
    .bind(pod_name)
    .bind(phase)
    .bind(logs)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_step_logs(pool: &PgPool, step_run_id: i64) -> Result<Vec<StepLogRecord>> {
    Ok(sqlx::query_as::<_, StepLogRecord>(
        "SELECT * FROM flow_step_logs WHERE step_run_id = $1 ORDER BY node_id, pod_name",
    )
    .bind(step_run_id)
    .fetch_all(pool)
    .await?)
}
