//! C3a — single-task manifest synthesis.
//!
//! One `Workflow` document with a single `main` template, `script` when
//! any dependency input is present
//! (so the bootstrap script runs first) or `container` when none are (a bare
//! `python -c` invocation needs no bootstrap at all).

use crate::bootstrap::{self, BootstrapSpec};
use crate::config::AppConfig;
use crate::error::Result;

use super::{
    base_volume_mounts, base_volumes, ContainerTemplate, EnvVar, Metadata, ScriptTemplate,
    Template, WorkflowManifest, WorkflowSpec,
};

/// Everything needed to synthesize a single-task manifest, independent of
/// the HTTP/store layer that gathers it.
#[derive(Debug, Clone)]
pub struct TaskManifestInput {
    pub python_code: String,
    pub python_deps: Option<String>,
    pub requirements_file: Option<String>,
    pub system_deps: Option<String>,
    pub use_cache: bool,
    pub task_id: String,
}

/// The base image switches on whether system dependencies are requested —
/// only the nix-portable image carries that binary.
fn base_image(config: &AppConfig, has_system_deps: bool) -> String {
    if has_system_deps {
        config.nix_base_image.clone()
    } else {
        config.python_base_image.clone()
    }
}

pub fn build(config: &AppConfig, input: &TaskManifestInput) -> Result<WorkflowManifest> {
    let spec = BootstrapSpec {
        python_deps: input.python_deps.clone(),
        requirements_file: input.requirements_file.clone(),
        system_deps: input.system_deps.clone(),
        use_cache: input.use_cache,
    };
    spec.validate()?;

    let has_dependencies =
        input.python_deps.is_some() || input.requirements_file.is_some() || input.system_deps.is_some();

    let volumes = base_volumes(
        &config.pvc.results_pvc,
        &config.pvc.uv_cache_pvc,
        &config.pvc.nix_store_pvc,
        input.use_cache,
    );
    let volume_mounts = base_volume_mounts(&config.pvc.results_mount_path, input.use_cache);

    let mut env = vec![
        EnvVar {
            name: "ARGO_WORKFLOW_NAME".to_string(),
            value: "{{workflow.name}}".to_string(),
        },
        EnvVar {
            name: "PYTHON_CODE".to_string(),
            value: input.python_code.clone(),
        },
    ];
    if let Some(deps) = &input.system_deps {
        env.push(EnvVar {
            name: "SYSTEM_DEPS".to_string(),
            value: deps.clone(),
        });
    }

    let image = base_image(config, input.system_deps.is_some());

    let main_template = if has_dependencies {
        if let Some(deps) = &input.python_deps {
            env.push(EnvVar {
                name: "PYTHON_DEPS".to_string(),
                value: deps.clone(),
            });
        } else if input.requirements_file.is_some() {
            env.push(EnvVar {
                name: "DEPENDENCIES".to_string(),
                value: "requirements.txt".to_string(),
            });
        }

        let source = bootstrap::build_script(&spec, &input.task_id)?;

        Template {
            name: "main".to_string(),
            script: Some(ScriptTemplate {
                image,
                image_pull_policy: "IfNotPresent".to_string(),
                command: vec!["bash".to_string()],
                source,
                env,
                volume_mounts,
            }),
            container: None,
            dag: None,
        }
    } else {
        Template {
            name: "main".to_string(),
            script: None,
            container: Some(ContainerTemplate {
                image,
                image_pull_policy: "IfNotPresent".to_string(),
                command: vec!["python".to_string(), "-c".to_string()],
                args: vec![input.python_code.clone()],
                env,
                volume_mounts,
            }),
            dag: None,
        }
    };

    Ok(WorkflowManifest {
        api_version: format!("{}/{}", crate::argo::GROUP, crate::argo::VERSION),
        kind: crate::argo::KIND.to_string(),
        metadata: Metadata {
            generate_name: "python-job-".to_string(),
            labels: Default::default(),
        },
        spec: WorkflowSpec {
            entrypoint: "main".to_string(),
            volumes,
            templates: vec![main_template],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(task_id: &str) -> TaskManifestInput {
        TaskManifestInput {
            python_code: "print('hi')".to_string(),
            python_deps: None,
            requirements_file: None,
            system_deps: None,
            use_cache: true,
            task_id: task_id.to_string(),
        }
    }

    #[test]
    fn no_dependencies_uses_container_template() {
        let config = AppConfig::default();
        let manifest = build(&config, &input("task-1")).unwrap();
        let tpl = &manifest.spec.templates[0];
        assert!(tpl.container.is_some());
        assert!(tpl.script.is_none());
        assert_eq!(manifest.metadata.generate_name, "python-job-");
    }

    #[test]
    fn dependencies_use_script_template_and_nix_image() {
        let config = AppConfig::default();
        let mut i = input("task-2");
        i.system_deps = Some("gcc".to_string());
        let manifest = build(&config, &i).unwrap();
        let tpl = &manifest.spec.templates[0];
        let script = tpl.script.as_ref().unwrap();
        assert_eq!(script.image, config.nix_base_image);
        assert!(script.source.contains("nix-shell"));
    }

    #[test]
    fn cache_disabled_omits_cache_volumes() {
        let config = AppConfig::default();
        let mut i = input("task-3");
        i.python_deps = Some("requests".to_string());
        i.use_cache = false;
        let manifest = build(&config, &i).unwrap();
        assert_eq!(manifest.spec.volumes.len(), 1);
    }

    #[test]
    fn invalid_dependency_string_rejected() {
        let config = AppConfig::default();
        let mut i = input("task-4");
        i.python_deps = Some("requests; rm -rf /".to_string());
        assert!(build(&config, &i).is_err());
    }
}
