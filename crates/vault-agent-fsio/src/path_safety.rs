//! Destination path validation and filename sanitization.

use std::path::{Component, Path};

use vault_agent_common::{AgentError, AgentResult};

/// Validate that a destination path is safe to write to: absolute, free of
/// `..` after normalization, and free of NUL bytes.
pub fn validate_destination(path: &Path) -> AgentResult<()> {
    let as_str = path.to_string_lossy();
    if as_str.contains('\0') {
        return Err(AgentError::UnsafePath(format!(
            "path contains a NUL byte: {as_str}"
        )));
    }

    if !path.is_absolute() {
        return Err(AgentError::UnsafePath(format!(
            "destination must be absolute: {as_str}"
        )));
    }

    for component in path.components() {
        if component == Component::ParentDir {
            return Err(AgentError::UnsafePath(format!(
                "destination must not contain '..': {as_str}"
            )));
        }
    }

    Ok(())
}

/// Replace shell metacharacters in a user-provided filename fragment with
/// underscores. Used when deriving a temp/backup filename from a target
/// name that ultimately comes from configuration.
pub fn sanitize_fragment(fragment: &str) -> String {
    fragment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        assert!(validate_destination(Path::new("relative/path")).is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_destination(Path::new("/etc/../etc/passwd")).is_err());
    }

    #[test]
    fn rejects_nul_bytes() {
        let bad = format!("/tmp/{}x", '\0');
        assert!(validate_destination(Path::new(&bad)).is_err());
    }

    #[test]
    fn accepts_plain_absolute_path() {
        assert!(validate_destination(Path::new("/etc/ssl/certs/web.pem")).is_ok());
    }

    #[test]
    fn sanitizes_shell_metacharacters() {
        assert_eq!(sanitize_fragment("web; rm -rf /"), "web__rm_-rf__");
        assert_eq!(sanitize_fragment("db-prod_01.env"), "db-prod_01.env");
    }
}
