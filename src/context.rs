//! Shared state handed to every HTTP handler and background task.

use std::sync::Arc;

use kube::Client;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::helper_pod::HelperPodHandle;
use crate::monitor::metrics::Metrics;

/// Process-wide shared context.
///
/// The store is the durable shared state (§5); the helper pod is
/// process-global singleton state guarded by a mutex, matching the
/// concurrency model's description of both.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub namespace: String,
    pub config: Arc<AppConfig>,
    pub db: PgPool,
    pub helper_pod: Arc<Mutex<HelperPodHandle>>,
    pub metrics: Arc<Metrics>,
}
