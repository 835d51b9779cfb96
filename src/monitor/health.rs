//! Liveness/readiness checks.

use serde::Serialize;

use crate::context::Context;

#[derive(Debug, Serialize)]
pub struct ReadyStatus {
    pub store: bool,
    pub engine: bool,
    pub helper_pod: bool,
}

impl ReadyStatus {
    pub fn is_ready(&self) -> bool {
        self.store && self.engine && self.helper_pod
    }
}

/// Liveness never touches external dependencies — it only proves the
/// process is scheduling async tasks.
pub fn liveness() -> &'static str {
    "ok"
}

pub async fn readiness(ctx: &Context) -> ReadyStatus {
    let store = sqlx::query("SELECT 1").execute(&ctx.db).await.is_ok();
    let engine = crate::argo::workflows_api(&ctx.client, &ctx.namespace)
        .list(&kube::api::ListParams::default().limit(1))
        .await
        .is_ok();
    let helper_pod = ctx.helper_pod.lock().await.ready;

    ReadyStatus {
        store,
        engine,
        helper_pod,
    }
}
