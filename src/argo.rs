//! Workflow-engine integration.
//!
//! The engine (Argo Workflows) owns the `Workflow` custom resource; this
//! core does not define or install that CRD, so it is addressed through
//! `kube`'s dynamic-object API rather than a `#[derive(CustomResource)]`
//! type.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ApiResource, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

pub const GROUP: &str = "argoproj.io";
pub const VERSION: &str = "v1alpha1";
pub const KIND: &str = "Workflow";
pub const PLURAL: &str = "workflows";

/// The owner-label the engine attaches to every pod it schedules for a
/// workflow, used to resolve pods by workflow id (§6).
pub fn workflow_owner_label(workflow_id: &str) -> String {
    format!("workflows.argoproj.io/workflow={workflow_id}")
}

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(GROUP, VERSION, KIND))
}

pub fn workflows_api(client: &Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(client.clone(), namespace, &api_resource())
}

pub fn pods_api(client: &Client, namespace: &str) -> Api<Pod> {
    Api::namespaced(client.clone(), namespace)
}

/// A single node record inside `status.nodes`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeStatus {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub phase: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "templateName", default)]
    pub template_name: Option<String>,
}

/// Parsed shape of `status` on a `Workflow` object — `metadata`/`spec` are
/// left as opaque JSON since this core only ever reads `status`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WorkflowStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "startedAt", default)]
    pub started_at: Option<String>,
    #[serde(rename = "finishedAt", default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,
}

impl WorkflowStatus {
    pub fn from_object(obj: &DynamicObject) -> Self {
        obj.data
            .get("status")
            .cloned()
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase.as_str(), "Succeeded" | "Failed" | "Error")
    }
}

/// Submit a synthesized manifest document (already containing
/// `generateName`) and return the engine-assigned name.
///
/// Failure to observe a valid name is a synthesis failure (§4.3).
#[instrument(skip(client, manifest), fields(namespace = %namespace))]
pub async fn submit_workflow(
    client: &Client,
    namespace: &str,
    manifest: Value,
) -> Result<String> {
    let api = workflows_api(client, namespace);
    let obj: DynamicObject = serde_json::from_value(manifest)?;
    let created = api.create(&PostParams::default(), &obj).await?;
    let name = created.name_any();
    if name.is_empty() {
        return Err(Error::Internal(anyhow::anyhow!(
            "engine did not assign a workflow name"
        )));
    }
    Ok(name)
}

#[instrument(skip(client), fields(namespace = %namespace, workflow_id = %workflow_id))]
pub async fn get_workflow_status(
    client: &Client,
    namespace: &str,
    workflow_id: &str,
) -> Result<WorkflowStatus> {
    let api = workflows_api(client, namespace);
    let obj = api.get(workflow_id).await?;
    Ok(WorkflowStatus::from_object(&obj))
}

/// Delete the workflow custom resource. A 404 is treated as success per §5
/// ("Cancellation... delete the workflow custom resource") and §7
/// ("Not-found from engine on delete: treated as success").
#[instrument(skip(client), fields(namespace = %namespace, workflow_id = %workflow_id))]
pub async fn delete_workflow(client: &Client, namespace: &str, workflow_id: &str) -> Result<()> {
    let api = workflows_api(client, namespace);
    match api.delete(workflow_id, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!("workflow {workflow_id} already absent, treating delete as success");
            Ok(())
        }
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Force the engine controller to re-evaluate a workflow by touching an
/// annotation — used as a last resort when logs/status appear stuck.
pub async fn nudge_workflow(client: &Client, namespace: &str, workflow_id: &str) -> Result<()> {
    let api = workflows_api(client, namespace);
    let patch = serde_json::json!({
        "metadata": {
            "annotations": { "flow-controller.io/resync-ts": chrono::Utc::now().to_rfc3339() }
        }
    });
    api.patch(
        workflow_id,
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// List pods owned by a workflow, used as the fallback resolution path
/// when a node's display-name/id fields don't directly name the pod
/// (§4.5 engine log fetch sub-algorithm).
pub async fn list_workflow_pods(
    client: &Client,
    namespace: &str,
    workflow_id: &str,
) -> Result<Vec<Pod>> {
    let api = pods_api(client, namespace);
    let lp = ListParams::default().labels(&workflow_owner_label(workflow_id));
    let list = api.list(&lp).await?;
    if list.items.is_empty() {
        warn!(workflow_id, "no pods found for workflow owner label");
    }
    Ok(list.items)
}
