//! Dependency-string and path validation (§7 `Validation` error kind).
//!
//! Non-goals (spec.md §1) bound this deliberately: no package-resolver
//! semantics, no Python parsing, no sandboxing — just length bounds and a
//! denylist of shell metacharacters, since dependency strings are only
//! ever interpolated into the bootstrap script via environment variables
//! (§4.2), never shell syntax directly.

use crate::error::{Error, Result};

const MAX_DEPENDENCY_LEN: usize = 10 * 1024;
const MAX_REQUIREMENTS_LEN: usize = 256 * 1024;

/// Shell metacharacters the denylist rejects in dependency strings:
/// `; && || `` $(`.
const DENYLIST: &[&str] = &[";", "&&", "||", "`", "$("];

/// Reject dependency text containing denylisted shell metacharacters or
/// exceeding the length bound. Applies to `python_deps` and `system_deps`.
pub fn validate_dependency_string(label: &str, value: &str) -> Result<()> {
    if value.len() > MAX_DEPENDENCY_LEN {
        return Err(Error::Validation(format!(
            "{label} exceeds maximum length {MAX_DEPENDENCY_LEN} (was {})",
            value.len()
        )));
    }

    for token in DENYLIST {
        if value.contains(token) {
            return Err(Error::Validation(format!(
                "{label} contains disallowed shell metacharacter sequence: {token}"
            )));
        }
    }

    Ok(())
}

/// Requirements-file text is free-form (it is written verbatim to disk,
/// never interpolated into shell syntax) but still length-bounded.
pub fn validate_requirements_text(value: &str) -> Result<()> {
    if value.len() > MAX_REQUIREMENTS_LEN {
        return Err(Error::Validation(format!(
            "requirements_file exceeds maximum length {MAX_REQUIREMENTS_LEN} (was {})",
            value.len()
        )));
    }
    Ok(())
}

/// Reject any path not lying under the result mount (or its single
/// parent-mount alias), per the Volume Helper Pod Manager's path policy
/// (§4.6).
pub fn validate_result_path(mount_path: &str, requested: &str) -> Result<String> {
    let mount = mount_path.trim_end_matches('/');
    let normalized = if requested.starts_with('/') {
        requested.to_string()
    } else {
        format!("{mount}/{requested}")
    };

    // Reject traversal components outright; a legitimate path never needs them.
    if normalized.split('/').any(|seg| seg == "..") {
        return Err(Error::Validation(format!(
            "path {requested} contains a parent-directory traversal component"
        )));
    }

    if normalized == mount || normalized.starts_with(&format!("{mount}/")) {
        Ok(normalized)
    } else {
        Err(Error::Validation(format!(
            "path {requested} does not lie under the result mount {mount}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_dependency_list() {
        assert!(validate_dependency_string("python_deps", "requests numpy pandas").is_ok());
    }

    #[test]
    fn rejects_semicolon_injection() {
        assert!(validate_dependency_string("python_deps", "requests; rm -rf /").is_err());
    }

    #[test]
    fn rejects_command_substitution() {
        assert!(validate_dependency_string("system_deps", "gcc $(whoami)").is_err());
    }

    #[test]
    fn rejects_backticks() {
        assert!(validate_dependency_string("python_deps", "requests`id`").is_err());
    }

    #[test]
    fn rejects_oversized_dependency_string() {
        let huge = "a".repeat(MAX_DEPENDENCY_LEN + 1);
        assert!(validate_dependency_string("python_deps", &huge).is_err());
    }

    #[test]
    fn path_under_mount_is_accepted() {
        assert_eq!(
            validate_result_path("/mnt/results", "/mnt/results/task-1/out.json").unwrap(),
            "/mnt/results/task-1/out.json"
        );
    }

    #[test]
    fn relative_path_is_joined_to_mount() {
        assert_eq!(
            validate_result_path("/mnt/results", "task-1/out.json").unwrap(),
            "/mnt/results/task-1/out.json"
        );
    }

    #[test]
    fn path_outside_mount_is_rejected() {
        assert!(validate_result_path("/mnt/results", "/etc/passwd").is_err());
    }

    #[test]
    fn path_with_traversal_is_rejected() {
        assert!(validate_result_path("/mnt/results", "../etc/passwd").is_err());
    }
}
