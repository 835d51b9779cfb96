//! C3b — multi-step flow (DAG) manifest synthesis.
//!
//! One `Workflow` document per flow run, one `script` template per step,
//! and a single `dag` template listing each step's Argo-level dependencies.
//! Step-to-step data exchange
//! goes through `/mnt/results/<step_id>/output.json` (see
//! [`crate::bootstrap::build_step_script`]), not Argo output parameters.

use std::collections::{BTreeMap, HashSet};

use crate::bootstrap::{self, BootstrapSpec};
use crate::config::AppConfig;
use crate::error::{Error, Result};

use super::{
    base_volume_mounts, base_volumes, DagTask, DagTemplate, EnvVar, Metadata, ScriptTemplate,
    Template, WorkflowManifest, WorkflowSpec,
};

#[derive(Debug, Clone)]
pub struct FlowStepInput {
    pub id: String,
    pub name: String,
    pub python_code: String,
    pub python_deps: Option<String>,
    pub requirements_file: Option<String>,
    pub system_deps: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct FlowManifestInput {
    pub steps: Vec<FlowStepInput>,
    pub edges: Vec<FlowEdge>,
    pub use_cache: bool,
}

/// Depth-first cycle check over the edge-derived dependency map: a node
/// currently on the recursion stack that is revisited is a back-edge, i.e.
/// a cycle.
fn has_cycle(
    step_id: &str,
    deps: &BTreeMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
) -> bool {
    visited.insert(step_id.to_string());
    rec_stack.insert(step_id.to_string());

    if let Some(dependencies) = deps.get(step_id) {
        for dep in dependencies {
            if !visited.contains(dep) {
                if has_cycle(dep, deps, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(dep) {
                return true;
            }
        }
    }

    rec_stack.remove(step_id);
    false
}

fn validate_dag(input: &FlowManifestInput) -> Result<BTreeMap<String, Vec<String>>> {
    if input.steps.is_empty() {
        return Err(Error::Validation(
            "flow definition must contain at least one step".to_string(),
        ));
    }

    let step_ids: HashSet<String> = input.steps.iter().map(|s| s.id.clone()).collect();
    let mut deps: BTreeMap<String, Vec<String>> =
        step_ids.iter().map(|id| (id.clone(), Vec::new())).collect();

    for edge in &input.edges {
        if !step_ids.contains(&edge.source) || !step_ids.contains(&edge.target) {
            return Err(Error::Validation(format!(
                "edge references invalid step: source={}, target={}",
                edge.source, edge.target
            )));
        }
        deps.get_mut(&edge.target).unwrap().push(edge.source.clone());
    }

    let mut visited = HashSet::new();
    for step_id in &step_ids {
        if !visited.contains(step_id) {
            let mut rec_stack = HashSet::new();
            if has_cycle(step_id, &deps, &mut visited, &mut rec_stack) {
                return Err(Error::Cyclic);
            }
        }
    }

    Ok(deps)
}

fn base_image(config: &AppConfig, has_system_deps: bool) -> String {
    if has_system_deps {
        config.nix_base_image.clone()
    } else {
        config.python_base_image.clone()
    }
}

pub fn build(config: &AppConfig, input: &FlowManifestInput) -> Result<WorkflowManifest> {
    let deps = validate_dag(input)?;

    let volumes = base_volumes(
        &config.pvc.results_pvc,
        &config.pvc.uv_cache_pvc,
        &config.pvc.nix_store_pvc,
        input.use_cache,
    );
    let volume_mounts = base_volume_mounts(&config.pvc.results_mount_path, input.use_cache);

    let mut templates = Vec::with_capacity(input.steps.len() + 1);
    let mut dag_tasks = Vec::with_capacity(input.steps.len());

    for step in &input.steps {
        let bootstrap_spec = BootstrapSpec {
            python_deps: step.python_deps.clone(),
            requirements_file: step.requirements_file.clone(),
            system_deps: step.system_deps.clone(),
            use_cache: input.use_cache,
        };
        bootstrap_spec.validate()?;

        let mut env = vec![
            EnvVar {
                name: "ARGO_WORKFLOW_NAME".to_string(),
                value: "{{workflow.name}}".to_string(),
            },
            EnvVar {
                name: "STEP_ID".to_string(),
                value: step.id.clone(),
            },
            EnvVar {
                name: "STEP_NAME".to_string(),
                value: step.name.clone(),
            },
        ];
        if let Some(deps) = &step.system_deps {
            env.push(EnvVar {
                name: "SYSTEM_DEPS".to_string(),
                value: deps.clone(),
            });
        }
        if let Some(deps) = &step.python_deps {
            env.push(EnvVar {
                name: "PYTHON_DEPS".to_string(),
                value: deps.clone(),
            });
        } else if step.requirements_file.is_some() {
            env.push(EnvVar {
                name: "DEPENDENCIES".to_string(),
                value: "requirements.txt".to_string(),
            });
        }

        let source = bootstrap::build_step_script(&bootstrap_spec, &step.id, &step.python_code)?;
        let image = base_image(config, step.system_deps.is_some());

        templates.push(Template {
            name: step.id.clone(),
            script: Some(ScriptTemplate {
                image,
                image_pull_policy: "IfNotPresent".to_string(),
                command: vec!["bash".to_string()],
                source,
                env,
                volume_mounts: volume_mounts.clone(),
            }),
            container: None,
            dag: None,
        });

        dag_tasks.push(DagTask {
            name: step.id.clone(),
            template: step.id.clone(),
            dependencies: deps.get(&step.id).cloned().unwrap_or_default(),
        });
    }

    templates.push(Template {
        name: "dag".to_string(),
        script: None,
        container: None,
        dag: Some(DagTemplate { tasks: dag_tasks }),
    });

    Ok(WorkflowManifest {
        api_version: format!("{}/{}", crate::argo::GROUP, crate::argo::VERSION),
        kind: crate::argo::KIND.to_string(),
        metadata: Metadata {
            generate_name: "flow-".to_string(),
            labels: Default::default(),
        },
        spec: WorkflowSpec {
            entrypoint: "dag".to_string(),
            volumes,
            templates,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> FlowStepInput {
        FlowStepInput {
            id: id.to_string(),
            name: id.to_string(),
            python_code: "print('hi')".to_string(),
            python_deps: None,
            requirements_file: None,
            system_deps: None,
        }
    }

    #[test]
    fn single_step_flow_builds_dag_with_no_dependencies() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a")],
            edges: vec![],
            use_cache: true,
        };
        let manifest = build(&config, &input).unwrap();
        assert_eq!(manifest.metadata.generate_name, "flow-");
        assert_eq!(manifest.spec.templates.len(), 2);
        let dag = manifest.spec.templates.last().unwrap().dag.as_ref().unwrap();
        assert_eq!(dag.tasks.len(), 1);
        assert!(dag.tasks[0].dependencies.is_empty());
    }

    #[test]
    fn linear_chain_dependencies_propagate_to_dag_tasks() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a"), step("b"), step("c")],
            edges: vec![
                FlowEdge {
                    source: "a".to_string(),
                    target: "b".to_string(),
                },
                FlowEdge {
                    source: "b".to_string(),
                    target: "c".to_string(),
                },
            ],
            use_cache: true,
        };
        let manifest = build(&config, &input).unwrap();
        let dag = manifest.spec.templates.last().unwrap().dag.as_ref().unwrap();
        let c_task = dag.tasks.iter().find(|t| t.name == "c").unwrap();
        assert_eq!(c_task.dependencies, vec!["b".to_string()]);
    }

    #[test]
    fn cyclic_edges_are_rejected() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a"), step("b")],
            edges: vec![
                FlowEdge {
                    source: "a".to_string(),
                    target: "b".to_string(),
                },
                FlowEdge {
                    source: "b".to_string(),
                    target: "a".to_string(),
                },
            ],
            use_cache: true,
        };
        assert!(matches!(build(&config, &input), Err(Error::Cyclic)));
    }

    #[test]
    fn self_loop_is_rejected_as_cyclic() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a")],
            edges: vec![FlowEdge {
                source: "a".to_string(),
                target: "a".to_string(),
            }],
            use_cache: true,
        };
        assert!(matches!(build(&config, &input), Err(Error::Cyclic)));
    }

    #[test]
    fn edge_referencing_unknown_step_is_rejected() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a")],
            edges: vec![FlowEdge {
                source: "a".to_string(),
                target: "ghost".to_string(),
            }],
            use_cache: true,
        };
        assert!(build(&config, &input).is_err());
    }

    #[test]
    fn empty_step_list_is_rejected() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![],
            edges: vec![],
            use_cache: true,
        };
        assert!(build(&config, &input).is_err());
    }

    #[test]
    fn diamond_dag_is_accepted() {
        let config = AppConfig::default();
        let input = FlowManifestInput {
            steps: vec![step("a"), step("b"), step("c"), step("d")],
            edges: vec![
                FlowEdge { source: "a".to_string(), target: "b".to_string() },
                FlowEdge { source: "a".to_string(), target: "c".to_string() },
                FlowEdge { source: "b".to_string(), target: "d".to_string() },
                FlowEdge { source: "c".to_string(), target: "d".to_string() },
            ],
            use_cache: true,
        };
        let manifest = build(&config, &input).unwrap();
        let dag = manifest.spec.templates.last().unwrap().dag.as_ref().unwrap();
        let d_task = dag.tasks.iter().find(|t| t.name == "d").unwrap();
        assert_eq!(d_task.dependencies.len(), 2);
    }
}
