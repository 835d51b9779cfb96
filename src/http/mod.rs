//! HTTP boundary: axum `Router` assembly, middleware stack, and the
//! health/ready/metrics endpoints. Task, flow, and file operations are bound
//! in their own submodules.

pub mod files;
pub mod flows;
pub mod tasks;
pub mod ws;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::context::Context;
use crate::monitor::{health, metrics};

pub fn build_router(ctx: Context) -> Router {
    let cors = build_cors_layer(&ctx.config.cors_origins);
    let timeout_secs = ctx.config.http.request_timeout_secs;

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/tasks", post(tasks::submit_task).get(tasks::list_tasks))
        .route("/tasks/{id}", get(tasks::get_task).delete(tasks::purge_task))
        .route("/tasks/{id}/run", post(tasks::run_task))
        .route("/tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/tasks/{id}/runs/{run_number}/logs", get(tasks::run_logs))
        .route("/tasks/{id}/logs/stream", get(ws::stream_task_logs))
        .route("/flows", post(flows::create_flow).get(flows::list_flows))
        .route(
            "/flows/{id}",
            get(flows::get_flow).put(flows::update_flow).delete(flows::delete_flow),
        )
        .route("/flows/{id}/run", post(flows::run_flow))
        .route("/flows/{id}/runs/{run_number}/steps/{step_id}/run", post(flows::run_step))
        .route("/flows/{id}/runs", get(flows::list_flow_runs))
        .route("/flows/{id}/runs/{run_number}", get(flows::get_flow_run))
        .route("/flows/{id}/runs/{run_number}/logs", get(flows::flow_run_logs))
        .route("/flows/{id}/runs/{run_number}/manifest", get(flows::flow_run_manifest))
        .route("/flows/{id}/manifest/preview", post(flows::preview_flow_manifest))
        .route("/files", get(files::list_files))
        .route("/files/read", get(files::read_file))
        .route("/files/preview", get(files::preview_file))
        .route("/files/copy", post(files::copy_file))
        .route("/files/upload", post(files::upload_file))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(cors)
                .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs))),
        )
        .with_state(ctx)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
}

async fn health_handler() -> &'static str {
    health::liveness()
}

async fn ready_handler(
    axum::extract::State(ctx): axum::extract::State<Context>,
) -> axum::Json<health::ReadyStatus> {
    axum::Json(health::readiness(&ctx).await)
}

async fn metrics_handler(
    axum::extract::State(ctx): axum::extract::State<Context>,
) -> String {
    ctx.metrics.render()
}
