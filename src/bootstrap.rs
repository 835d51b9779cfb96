//! C2 — Bootstrap Script Builder.
//!
//! Produces the bash script a workflow pod runs before the user's Python
//! code: a hybrid uv (Python packages) / nix-portable (system packages)
//! provisioning sequence, followed by execution either directly or wrapped
//! in `nix-shell` when system dependencies are present.
//!
//! Dependency text never appears inside shell syntax. It is handed to the
//! script exclusively through environment variables (`$PYTHON_DEPS`,
//! `$SYSTEM_DEPS`, `$PYTHON_CODE`) that the caller sets via the manifest's
//! `env` list, never interpolated into this template. This file only
//! emits the *script*, not the values that fill those variables.

use crate::error::Result;
use crate::validation::{validate_dependency_string, validate_requirements_text};

/// Inputs accepted by the bootstrap builder (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct BootstrapSpec {
    pub python_deps: Option<String>,
    pub requirements_file: Option<String>,
    pub system_deps: Option<String>,
    pub use_cache: bool,
}

impl BootstrapSpec {
    pub fn validate(&self) -> Result<()> {
        if let Some(v) = &self.python_deps {
            validate_dependency_string("python_deps", v)?;
        }
        if let Some(v) = &self.requirements_file {
            validate_requirements_text(v)?;
        }
        if let Some(v) = &self.system_deps {
            validate_dependency_string("system_deps", v)?;
        }
        Ok(())
    }

    fn has_dependencies(&self) -> bool {
        self.python_deps.is_some() || self.requirements_file.is_some() || self.system_deps.is_some()
    }
}

/// Build the provisioning + execution script. `venv_tag` distinguishes the
/// venv directory per workflow; the caller passes the already-resolved
/// workflow id or step name so concurrent steps in one flow never collide
/// on `/tmp/venv-*`.
pub fn build_script(spec: &BootstrapSpec, venv_tag: &str) -> Result<String> {
    spec.validate()?;

    let mut lines: Vec<String> = Vec::new();
    lines.push("set -e".to_string());
    lines.push(String::new());

    if spec.has_dependencies() {
        push_system_deps_block(&mut lines, spec.use_cache);
        push_uv_bootstrap_block(&mut lines);
        push_venv_block(&mut lines, venv_tag, spec.use_cache);
        push_install_block(&mut lines, spec);
        push_execution_block(&mut lines, spec.system_deps.is_some());
    } else {
        lines.push("python -c \"$PYTHON_CODE\"".to_string());
    }

    Ok(lines.join("\n"))
}

fn push_system_deps_block(lines: &mut Vec<String>, use_cache: bool) {
    lines.push("if [ -n \"$SYSTEM_DEPS\" ]; then".to_string());
    lines.push("  if ! command -v nix-portable >/dev/null 2>&1; then".to_string());
    lines.push("    echo \"Error: nix-portable not found in image, cannot install system dependencies\"".to_string());
    lines.push("    exit 1".to_string());
    lines.push("  fi".to_string());

    if use_cache {
        lines.push("  export NP_STORE=~/.nix-portable/nix/store".to_string());
        lines.push("  mkdir -p \"$NP_STORE\"".to_string());
        lines.push("  if [ ! -e /nix/store ]; then".to_string());
        lines.push("    ln -s \"$NP_STORE\" /nix/store 2>/dev/null || true".to_string());
        lines.push("  fi".to_string());
        lines.push("  AVAIL_KB=$(df -P \"$NP_STORE\" | tail -1 | awk '{print $4}')".to_string());
        lines.push("  if [ \"$AVAIL_KB\" -lt 1048576 ]; then".to_string());
        lines.push("    echo \"Error: less than 1GB free under $NP_STORE, refusing to provision nix packages\"".to_string());
        lines.push("    exit 1".to_string());
        lines.push("  fi".to_string());
        lines.push("  if [ -f \"$NP_STORE/.nix-db/db.sqlite\" ] && [ ! -e ~/.nix-portable/nix/var/nix/db/db.sqlite ]; then".to_string());
        lines.push("    mkdir -p ~/.nix-portable/nix/var/nix/db".to_string());
        lines.push("    ln -sf \"$NP_STORE/.nix-db/db.sqlite\" ~/.nix-portable/nix/var/nix/db/db.sqlite".to_string());
        lines.push("    echo -e \"\\033[0;34m[NIX CACHE]\\033[0m linked existing database from shared store\"".to_string());
        lines.push("  fi".to_string());
    }

    lines.push("  NIX_PACKAGES=\"\"".to_string());
    lines.push("  NIX_SHELL_PACKAGES=\"\"".to_string());
    lines.push("  for pkg in $(echo \"$SYSTEM_DEPS\" | tr ',' ' '); do".to_string());
    lines.push("    NIX_PACKAGES=\"$NIX_PACKAGES nixpkgs#$pkg\"".to_string());
    lines.push("    NIX_SHELL_PACKAGES=\"$NIX_SHELL_PACKAGES -p $pkg\"".to_string());
    lines.push("  done".to_string());
    lines.push("fi".to_string());
    lines.push(String::new());
}

fn push_uv_bootstrap_block(lines: &mut Vec<String>) {
    lines.push("if ! command -v uv >/dev/null 2>&1; then".to_string());
    lines.push("  curl -LsSf https://astral.sh/uv/install.sh | sh".to_string());
    lines.push("  export PATH=\"$HOME/.cargo/bin:$PATH\"".to_string());
    lines.push("fi".to_string());
    lines.push(String::new());
}

fn push_venv_block(lines: &mut Vec<String>, venv_tag: &str, use_cache: bool) {
    if use_cache {
        lines.push("export UV_CACHE_DIR=/root/.cache/uv".to_string());
        lines.push("mkdir -p \"$UV_CACHE_DIR\"".to_string());
    }
    lines.push(format!("VENV_DIR=\"/tmp/venv-{venv_tag}\""));
    lines.push("uv venv \"$VENV_DIR\"".to_string());
    lines.push("source \"$VENV_DIR/bin/activate\"".to_string());
    lines.push(String::new());
}

fn push_install_block(lines: &mut Vec<String>, spec: &BootstrapSpec) {
    if let Some(req) = &spec.requirements_file {
        lines.push("cat > /tmp/requirements.txt << 'REQ_EOF'".to_string());
        lines.push(req.clone());
        lines.push("REQ_EOF".to_string());
        lines.push("uv pip install -r /tmp/requirements.txt".to_string());
    } else if spec.python_deps.is_some() {
        lines.push("echo \"$PYTHON_DEPS\" | tr ',' ' ' | xargs uv pip install".to_string());
    }
    lines.push(String::new());
}

fn push_execution_block(lines: &mut Vec<String>, has_system_deps: bool) {
    push_execution_block_with_command(lines, has_system_deps, "python -c \"$PYTHON_CODE\"");
}

fn push_execution_block_with_command(lines: &mut Vec<String>, has_system_deps: bool, run_cmd: &str) {
    if has_system_deps {
        lines.push("if [ -n \"$SYSTEM_DEPS\" ] && [ -n \"$NIX_SHELL_PACKAGES\" ]; then".to_string());
        lines.push("  TEMP_NIX_OUTPUT=$(mktemp)".to_string());
        lines.push(format!(
            "  timeout 300 nix-portable nix-shell $NIX_SHELL_PACKAGES --run '{run_cmd}' 2>&1 | tee \"$TEMP_NIX_OUTPUT\""
        ));
        lines.push("  NIX_EXIT=${PIPESTATUS[0]}".to_string());
        lines.push("  if [ \"$NIX_EXIT\" -ne 0 ]; then".to_string());
        lines.push("    exit \"$NIX_EXIT\"".to_string());
        lines.push("  fi".to_string());
        lines.push("else".to_string());
        lines.push(format!("  {run_cmd}"));
        lines.push("fi".to_string());
    } else {
        lines.push(run_cmd.to_string());
    }
}

/// Per-step variant for DAG flows: identical provisioning, plus a
/// `step_helpers` module injected on `PYTHONPATH` so step code can exchange
/// data through `/mnt/results/<step_id>/output.json` via
/// `read_step_output(step_id)` / `write_step_output(data)` — a file-based
/// handoff instead of Argo output parameters, since each step's result PVC
/// mount is already shared by the whole flow.
pub fn build_step_script(spec: &BootstrapSpec, step_id: &str, python_code: &str) -> Result<String> {
    spec.validate()?;

    let mut lines: Vec<String> = Vec::new();
    lines.push("set -e".to_string());
    lines.push(String::new());

    if spec.has_dependencies() {
        push_system_deps_block(&mut lines, spec.use_cache);
        push_uv_bootstrap_block(&mut lines);
        push_venv_block(&mut lines, step_id, spec.use_cache);
        push_install_block(&mut lines, spec);
    }

    push_step_helpers_block(&mut lines, python_code);
    push_execution_block_with_command(
        &mut lines,
        spec.system_deps.is_some(),
        "python /tmp/execute_step.py",
    );

    Ok(lines.join("\n"))
}

fn push_step_helpers_block(lines: &mut Vec<String>, python_code: &str) {
    lines.push("cat > /tmp/step_helpers.py << 'HELPERS_EOF'".to_string());
    lines.push("import json".to_string());
    lines.push("import os".to_string());
    lines.push("from pathlib import Path".to_string());
    lines.push(String::new());
    lines.push("def read_step_output(step_id, output_name='output'):".to_string());
    lines.push("    output_path = Path(f'/mnt/results/{step_id}/{output_name}.json')".to_string());
    lines.push("    if output_path.exists():".to_string());
    lines.push("        with open(output_path, 'r') as f:".to_string());
    lines.push("            return json.load(f)".to_string());
    lines.push("    return None".to_string());
    lines.push(String::new());
    lines.push("def write_step_output(data, output_name='output'):".to_string());
    lines.push("    step_id = os.getenv('STEP_ID', 'unknown')".to_string());
    lines.push("    output_dir = Path(f'/mnt/results/{step_id}')".to_string());
    lines.push("    output_dir.mkdir(parents=True, exist_ok=True)".to_string());
    lines.push("    output_path = output_dir / f'{output_name}.json'".to_string());
    lines.push("    with open(output_path, 'w') as f:".to_string());
    lines.push("        json.dump(data, f, indent=2)".to_string());
    lines.push("    return str(output_path)".to_string());
    lines.push("HELPERS_EOF".to_string());
    lines.push(String::new());
    lines.push("export PYTHONPATH=/tmp:$PYTHONPATH".to_string());
    lines.push(String::new());
    lines.push("cat > /tmp/execute_step.py << 'CODE_EOF'".to_string());
    lines.push("import sys".to_string());
    lines.push("sys.path.insert(0, '/tmp')".to_string());
    lines.push("from step_helpers import read_step_output, write_step_output".to_string());
    lines.push(String::new());
    lines.push(python_code.to_string());
    lines.push("CODE_EOF".to_string());
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dependencies_executes_directly() {
        let spec = BootstrapSpec::default();
        let script = build_script(&spec, "task-1").unwrap();
        assert!(script.contains("python -c \"$PYTHON_CODE\""));
        assert!(!script.contains("nix-shell"));
    }

    #[test]
    fn system_deps_wraps_in_nix_shell() {
        let spec = BootstrapSpec {
            system_deps: Some("gcc make".to_string()),
            use_cache: true,
            ..Default::default()
        };
        let script = build_script(&spec, "task-1").unwrap();
        assert!(script.contains("nix-portable nix-shell $NIX_SHELL_PACKAGES"));
        assert!(script.contains("NP_STORE"));
    }

    #[test]
    fn python_deps_only_skips_nix_shell_wrap() {
        let spec = BootstrapSpec {
            python_deps: Some("requests numpy".to_string()),
            use_cache: true,
            ..Default::default()
        };
        let script = build_script(&spec, "task-1").unwrap();
        assert!(script.contains("xargs uv pip install"));
        assert!(!script.contains("nix-shell"));
        assert!(script.contains("python -c \"$PYTHON_CODE\""));
    }

    #[test]
    fn requirements_file_written_via_heredoc() {
        let spec = BootstrapSpec {
            requirements_file: Some("requests==2.31.0\nnumpy\n".to_string()),
            use_cache: false,
            ..Default::default()
        };
        let script = build_script(&spec, "task-1").unwrap();
        assert!(script.contains("cat > /tmp/requirements.txt << 'REQ_EOF'"));
        assert!(script.contains("requests==2.31.0"));
        assert!(script.contains("uv pip install -r /tmp/requirements.txt"));
        assert!(!script.contains("UV_CACHE_DIR"));
    }

    #[test]
    fn venv_dir_is_tagged_per_workflow() {
        let spec = BootstrapSpec {
            python_deps: Some("requests".to_string()),
            ..Default::default()
        };
        let script = build_script(&spec, "wf-abc123").unwrap();
        assert!(script.contains("VENV_DIR=\"/tmp/venv-wf-abc123\""));
    }

    #[test]
    fn step_script_tags_venv_by_step_name() {
        let spec = BootstrapSpec {
            python_deps: Some("requests".to_string()),
            ..Default::default()
        };
        let script = build_step_script(&spec, "fetch-data", "print('hi')").unwrap();
        assert!(script.contains("VENV_DIR=\"/tmp/venv-fetch-data\""));
        assert!(script.contains("from step_helpers import read_step_output, write_step_output"));
        assert!(script.contains("python /tmp/execute_step.py"));
    }

    #[test]
    fn invalid_dependency_string_is_rejected_before_script_construction() {
        let spec = BootstrapSpec {
            python_deps: Some("requests; rm -rf /".to_string()),
            ..Default::default()
        };
        assert!(build_script(&spec, "task-1").is_err());
    }

    #[test]
    fn dependency_values_never_appear_literally_outside_env_reads() {
        // The builder only ever reads $PYTHON_DEPS / $SYSTEM_DEPS / $PYTHON_CODE;
        // actual dependency values are supplied by the caller via the pod's env,
        // never interpolated into this template.
        let spec = BootstrapSpec {
            python_deps: Some("requests numpy".to_string()),
            system_deps: Some("gcc".to_string()),
            use_cache: true,
            ..Default::default()
        };
        let script = build_script(&spec, "task-1").unwrap();
        assert!(!script.contains("requests numpy"));
        assert!(!script.contains("\"gcc\""));
        assert!(script.contains("$PYTHON_DEPS"));
        assert!(script.contains("$SYSTEM_DEPS"));
    }

    #[test]
    fn no_cache_skips_uv_cache_dir_export() {
        let spec = BootstrapSpec {
            python_deps: Some("requests".to_string()),
            use_cache: false,
            ..Default::default()
        };
        let script = build_script(&spec, "task-1").unwrap();
        assert!(!script.contains("UV_CACHE_DIR"));
    }
}
