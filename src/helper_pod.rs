//! C6 — Volume Helper Pod Manager.
//!
//! Maintains one long-lived pod mounting the result volume so list/read/
//! preview/copy/upload operations never pay per-call pod startup latency.
//! No original-source equivalent exists for this component (the retrieval
//! pack's file-browser code was filtered out upstream); grounded instead on
//! general `kube-rs` Pod create/exec idioms and this codebase's own
//! idempotent-resource-creation style (`get-or-create`, tolerate-409/404).

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, AttachParams, DeleteParams, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::validation::validate_result_path;

const HELPER_POD_NAME: &str = "flow-controller-volume-helper";
const VOLUME_NAME: &str = "task-results";

#[derive(Debug, Clone)]
pub struct HelperPodHandle {
    pub pod_name: Option<String>,
    pub ready: bool,
}

impl Default for HelperPodHandle {
    fn default() -> Self {
        Self {
            pod_name: None,
            ready: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub mtime: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
}

pub enum FileContent {
    Text(String),
    Base64(String),
}

fn pod_manifest(config: &AppConfig, namespace: &str) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "flow-controller-helper".to_string());

    Pod {
        metadata: ObjectMeta {
            name: Some(HELPER_POD_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Always".to_string()),
            containers: vec![Container {
                name: "helper".to_string(),
                image: Some(config.helper_pod_image.clone()),
                command: Some(vec!["sh".to_string(), "-c".to_string(), "sleep infinity".to_string()]),
                volume_mounts: Some(vec![VolumeMount {
                    name: VOLUME_NAME.to_string(),
                    mount_path: config.pvc.results_mount_path.clone(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(
                    k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource {
                        claim_name: config.pvc.results_pvc.clone(),
                        read_only: None,
                    },
                ),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Get-or-create the helper pod, tolerating an already-exists conflict from
/// a concurrent starter, then wait (bounded poll) for it to become ready.
pub async fn ensure_ready(client: &Client, namespace: &str, config: &AppConfig) -> Result<HelperPodHandle> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);

    match api.get(HELPER_POD_NAME).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let manifest = pod_manifest(config, namespace);
            match api.create(&PostParams::default(), &manifest).await {
                Ok(_) => info!(pod = HELPER_POD_NAME, "created volume helper pod"),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    info!("volume helper pod already being created concurrently");
                }
                Err(e) => return Err(Error::Kube(e)),
            }
        }
        Err(e) => return Err(Error::Kube(e)),
    }

    wait_ready(&api, config.helper_pod.readiness_timeout_secs).await?;

    Ok(HelperPodHandle {
        pod_name: Some(HELPER_POD_NAME.to_string()),
        ready: true,
    })
}

async fn wait_ready(api: &Api<Pod>, timeout_secs: u64) -> Result<()> {
    let deadline = Duration::from_secs(timeout_secs);
    timeout(deadline, async {
        loop {
            if let Ok(pod) = api.get(HELPER_POD_NAME).await {
                if is_container_ready(&pod) {
                    return;
                }
            }
            sleep(Duration::from_millis(500)).await;
        }
    })
    .await
    .map_err(|_| Error::TransientEngine("volume helper pod did not become ready in time".to_string()))
}

fn is_container_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().all(|c| c.ready))
        .unwrap_or(false)
}

/// Run a shell script inside the helper pod by base64-encoding it to a temp
/// file and decoding+executing it there, avoiding shell-quoting pitfalls
/// with large payloads (§4.6 "Script transport").
async fn exec_script(client: &Client, namespace: &str, script: &str) -> Result<String> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let encoded = BASE64.encode(script);
    let wrapper = format!(
        "echo {encoded} | base64 -d > /tmp/.helper-op.sh && sh /tmp/.helper-op.sh; rm -f /tmp/.helper-op.sh"
    );

    let mut attached = api
        .exec(
            HELPER_POD_NAME,
            vec!["sh", "-c", &wrapper],
            &AttachParams::default().stdout(true).stderr(true),
        )
        .await?;

    let mut stdout_buf = String::new();
    if let Some(mut stdout) = attached.stdout() {
        stdout.read_to_string(&mut stdout_buf).await.ok();
    }
    attached.join().await.ok();
    Ok(stdout_buf)
}

/// Retries the operation exactly once after deleting and recreating the
/// pod, per §4.6 "Failure recovery".
async fn exec_with_recovery(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    script: &str,
) -> Result<String> {
    match exec_script(client, namespace, script).await {
        Ok(out) => Ok(out),
        Err(e) => {
            warn!(error = %e, "helper pod exec failed, recreating and retrying once");
            let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
            let _ = api.delete(HELPER_POD_NAME, &DeleteParams::default()).await;
            ensure_ready(client, namespace, config).await?;
            exec_script(client, namespace, script).await
        }
    }
}

pub async fn list(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    path: &str,
) -> Result<Vec<Entry>> {
    let resolved = validate_result_path(&config.pvc.results_mount_path, path)?;
    let script = format!(
        "find '{resolved}' -mindepth 1 -maxdepth 1 -printf '%y|%f|%s|%T@\\n' 2>/dev/null"
    );
    let output = exec_with_recovery(client, namespace, config, &script).await?;

    let mut entries = Vec::new();
    for (i, line) in output.lines().enumerate() {
        let mut parts = line.splitn(4, '|');
        let (Some(kind), Some(name), Some(size), Some(mtime)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        entries.push(Entry {
            id: format!("{resolved}/{name}#{i}"),
            name: name.to_string(),
            entry_type: if kind == "d" { EntryType::Folder } else { EntryType::File },
            size: size.parse().unwrap_or(0),
            mtime: mtime.to_string(),
        });
    }
    Ok(entries)
}

pub async fn read(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    path: &str,
) -> Result<FileContent> {
    let resolved = validate_result_path(&config.pvc.results_mount_path, path)?;
    let script = format!("base64 -w0 '{resolved}' 2>/dev/null");
    let encoded = exec_with_recovery(client, namespace, config, &script).await?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::Internal(anyhow::anyhow!("helper pod returned non-base64 output: {e}")))?;

    match String::from_utf8(bytes.clone()) {
        Ok(text) => Ok(FileContent::Text(text)),
        Err(_) => Ok(FileContent::Base64(BASE64.encode(bytes))),
    }
}

/// Images are returned the same way `read` returns non-text content; the
/// caller (HTTP layer) attaches the media type from the path's extension.
pub async fn preview(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    path: &str,
) -> Result<FileContent> {
    read(client, namespace, config, path).await
}

pub async fn copy(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    source: &str,
    destination: &str,
) -> Result<()> {
    let resolved_source = validate_result_path(&config.pvc.results_mount_path, source)?;
    let resolved_dest = validate_result_path(&config.pvc.results_mount_path, destination)?;
    let script = format!("cp '{resolved_source}' '{resolved_dest}' && chmod 644 '{resolved_dest}'");
    exec_with_recovery(client, namespace, config, &script).await?;
    Ok(())
}

/// Writes atomically via a temp-file-then-rename; if `filename` already
/// exists under `dir`, appends `_N` until a free name is found.
pub async fn upload(
    client: &Client,
    namespace: &str,
    config: &AppConfig,
    dir: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<String> {
    let resolved_dir = validate_result_path(&config.pvc.results_mount_path, dir)?;
    let encoded = BASE64.encode(bytes);

    let script = format!(
        r#"
mkdir -p '{resolved_dir}'
base="{filename}"
name="$base"
n=1
while [ -e "{resolved_dir}/$name" ]; do
  ext="${{base##*.}}"
  stem="${{base%.*}}"
  if [ "$ext" = "$base" ]; then
    name="${{base}}_$n"
  else
    name="${{stem}}_$n.$ext"
  fi
  n=$((n + 1))
done
echo "{encoded}" | base64 -d > "{resolved_dir}/$name.tmp"
mv "{resolved_dir}/$name.tmp" "{resolved_dir}/$name"
echo "$name"
"#
    );

    let output = exec_with_recovery(client, namespace, config, &script).await?;
    let final_name = output.trim().to_string();
    if final_name.is_empty() {
        return Err(Error::Internal(anyhow::anyhow!(
            "helper pod did not report the uploaded filename"
        )));
    }
    Ok(format!("{resolved_dir}/{final_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_manifest_mounts_results_volume() {
        let config = AppConfig::default();
        let pod = pod_manifest(&config, "argo");
        let spec = pod.spec.unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Always"));
        let mounts = spec.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, config.pvc.results_mount_path);
    }

    #[test]
    fn handle_default_is_not_ready() {
        let handle = HelperPodHandle::default();
        assert!(!handle.ready);
        assert!(handle.pod_name.is_none());
    }
}
