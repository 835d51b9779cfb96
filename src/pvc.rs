//! Persistent-volume-claim preconditions (§4.3, §6 "Persistent volume claims").
//!
//! `task-results-pvc` is always required; `uv-cache-pvc`/`nix-store-pvc` are
//! required only when caching is requested. A missing claim or one not yet
//! `Bound` surfaces as a `Precondition` error before any workflow is
//! submitted, never as a submission failure from the engine itself.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::Api;
use kube::Client;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{Error, Result};

/// Verify every PVC this submission will mount exists and is `Bound`.
pub async fn ensure_required_pvcs_bound(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    use_cache: bool,
) -> Result<()> {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);

    let mut required = vec![config.pvc.results_pvc.as_str()];
    if use_cache {
        required.push(config.pvc.uv_cache_pvc.as_str());
        required.push(config.pvc.nix_store_pvc.as_str());
    }

    for name in required {
        match api.get(name).await {
            Ok(pvc) => {
                let phase = pvc
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                if phase != "Bound" {
                    return Err(Error::Precondition(format!(
                        "PVC '{name}' is not bound. Current status: {phase}."
                    )));
                }
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Err(Error::Precondition(format!(
                    "PVC '{name}' not found in namespace '{namespace}'."
                )));
            }
            Err(e) => {
                warn!(pvc = name, error = %e, "could not verify PVC status, proceeding");
            }
        }
    }

    Ok(())
}
