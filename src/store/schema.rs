//! DDL and runtime schema evolution.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` on the current (not
//! legacy) shape, then a second pass adds any columns a pre-existing legacy
//! table is missing via `ALTER TABLE ... ADD COLUMN IF NOT EXISTS`, so the
//! same binary can boot against either a fresh database or one carrying an
//! older shape. Failures during the evolution pass are logged, not fatal —
//! the adapter falls back to legacy-read mode (see [`super::queries`]).

use sqlx::PgPool;
use tracing::warn;

const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    python_code TEXT NOT NULL,
    python_deps TEXT,
    requirements_file TEXT,
    system_deps TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_TASK_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS task_runs (
    id BIGSERIAL PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    workflow_id TEXT NOT NULL UNIQUE,
    run_number BIGINT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'Pending',
    python_code TEXT NOT NULL,
    python_deps TEXT,
    requirements_file TEXT,
    system_deps TEXT,
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (task_id, run_number)
)
"#;

const CREATE_TASK_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS task_logs (
    id BIGSERIAL PRIMARY KEY,
    run_id BIGINT REFERENCES task_runs(id) ON DELETE CASCADE,
    node_id TEXT NOT NULL,
    pod_name TEXT NOT NULL,
    phase TEXT NOT NULL,
    logs TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (run_id, node_id, pod_name)
)
"#;

const CREATE_FLOWS: &str = r#"
CREATE TABLE IF NOT EXISTS flows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    definition JSONB NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_FLOW_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS flow_runs (
    id BIGSERIAL PRIMARY KEY,
    flow_id TEXT NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
    workflow_id TEXT NOT NULL UNIQUE,
    run_number BIGINT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'Pending',
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (flow_id, run_number)
)
"#;

const CREATE_FLOW_STEP_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS flow_step_runs (
    id BIGSERIAL PRIMARY KEY,
    flow_run_id BIGINT NOT NULL REFERENCES flow_runs(id) ON DELETE CASCADE,
    step_id TEXT NOT NULL,
    workflow_node_id TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'Pending',
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ
)
"#;

const CREATE_FLOW_STEP_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS flow_step_logs (
    id BIGSERIAL PRIMARY KEY,
    step_run_id BIGINT NOT NULL REFERENCES flow_step_runs(id) ON DELETE CASCADE,
    node_id TEXT NOT NULL,
    pod_name TEXT NOT NULL,
    phase TEXT NOT NULL,
    logs TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (step_run_id, node_id, pod_name)
)
"#;

/// Columns a legacy deployment may be missing; each entry is independently
/// idempotent so a partially-evolved database converges on re-run.
const EVOLUTIONS: &[(&str, &str, &str)] = &[
    ("tasks", "system_deps", "ALTER TABLE tasks ADD COLUMN IF NOT EXISTS system_deps TEXT"),
    (
        "task_runs",
        "system_deps",
        "ALTER TABLE task_runs ADD COLUMN IF NOT EXISTS system_deps TEXT",
    ),
    (
        "task_runs",
        "python_code",
        "ALTER TABLE task_runs ADD COLUMN IF NOT EXISTS python_code TEXT NOT NULL DEFAULT ''",
    ),
    (
        "task_logs",
        "run_id",
        "ALTER TABLE task_logs ADD COLUMN IF NOT EXISTS run_id BIGINT REFERENCES task_runs(id) ON DELETE CASCADE",
    ),
];

/// Create every table (idempotent) and then apply the legacy-column
/// evolutions (also idempotent). Called once at startup.
pub async fn initialize(pool: &PgPool) -> sqlx::Result<()> {
    for ddl in [
        CREATE_TASKS,
        CREATE_TASK_RUNS,
        CREATE_TASK_LOGS,
        CREATE_FLOWS,
        CREATE_FLOW_RUNS,
        CREATE_FLOW_STEP_RUNS,
        CREATE_FLOW_STEP_LOGS,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    for (table, column, ddl) in EVOLUTIONS {
        if let Err(e) = sqlx::query(ddl).execute(pool).await {
            warn!(table = %table, column = %column, error = %e, "schema evolution step failed, continuing in legacy-read mode");
        }
    }

    Ok(())
}

/// True if `column` exists on `table`, used to decide whether a query can
/// use the current-schema form or must fall back to the legacy form.
pub async fn has_column(pool: &PgPool, table: &str, column: &str) -> bool {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_name = $1 AND column_name = $2
        )",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(pool)
    .await
    .unwrap_or(None);

    row.map(|(exists,)| exists).unwrap_or(false)
}
