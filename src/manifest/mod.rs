//! C3 — Manifest Synthesizer.
//!
//! Builds the `Workflow` custom-resource document submitted to the engine:
//! typed Rust structs here, serialized by `serde_json` at the
//! `argo::submit_workflow` call site, rather than string-templating YAML.

pub mod flow;
pub mod task;

use serde::Serialize;

/// Mirrors the subset of the Argo `Workflow` spec this core ever populates.
/// Field names are serialized in the engine's own casing via `rename`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Metadata {
    #[serde(rename = "generateName")]
    pub generate_name: String,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSpec {
    pub entrypoint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    pub name: String,
    #[serde(rename = "persistentVolumeClaim")]
    pub persistent_volume_claim: PvcRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct PvcRef {
    #[serde(rename = "claimName")]
    pub claim_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeMount {
    pub name: String,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A template is either a `script` (bash source executed by an interpreter
/// image) or a `container` (direct image invocation), picked per task/step
/// depending on whether a bootstrap script is needed at all.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagTemplate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptTemplate {
    pub image: String,
    #[serde(rename = "imagePullPolicy")]
    pub image_pull_policy: String,
    pub command: Vec<String>,
    pub source: String,
    pub env: Vec<EnvVar>,
    #[serde(rename = "volumeMounts")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerTemplate {
    pub image: String,
    #[serde(rename = "imagePullPolicy")]
    pub image_pull_policy: String,
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    #[serde(rename = "volumeMounts")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagTemplate {
    pub tasks: Vec<DagTask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagTask {
    pub name: String,
    pub template: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Shared volume/mount construction (§4.3): always the results PVC, plus the
/// uv-cache and nix-store PVCs when caching is enabled. Identical between
/// the single-task and flow code paths.
pub fn base_volumes(
    results_pvc: &str,
    uv_cache_pvc: &str,
    nix_store_pvc: &str,
    use_cache: bool,
) -> Vec<Volume> {
    let mut volumes = vec![Volume {
        name: "task-results".to_string(),
        persistent_volume_claim: PvcRef {
            claim_name: results_pvc.to_string(),
        },
    }];
    if use_cache {
        volumes.push(Volume {
            name: "uv-cache".to_string(),
            persistent_volume_claim: PvcRef {
                claim_name: uv_cache_pvc.to_string(),
            },
        });
        volumes.push(Volume {
            name: "nix-store".to_string(),
            persistent_volume_claim: PvcRef {
                claim_name: nix_store_pvc.to_string(),
            },
        });
    }
    volumes
}

pub fn base_volume_mounts(results_mount_path: &str, use_cache: bool) -> Vec<VolumeMount> {
    let mut mounts = vec![VolumeMount {
        name: "task-results".to_string(),
        mount_path: results_mount_path.to_string(),
    }];
    if use_cache {
        mounts.push(VolumeMount {
            name: "uv-cache".to_string(),
            mount_path: "/root/.cache/uv".to_string(),
        });
        mounts.push(VolumeMount {
            name: "nix-store".to_string(),
            mount_path: "/root/.nix-portable/nix/store".to_string(),
        });
    }
    mounts
}
