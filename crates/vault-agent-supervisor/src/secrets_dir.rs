//! Materializes sensitive environment values as files instead of passing
//! them through the process environment.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use vault_agent_common::{AgentError, AgentResult};

/// Default materialization directory, expected to live on tmpfs.
pub const DEFAULT_SECRETS_DIR: &str = "/run/zn-vault-agent/secrets";

/// Ensures `dir` exists with mode 0700.
pub fn ensure_secrets_dir(dir: &Path) -> AgentResult<()> {
    std::fs::create_dir_all(dir).map_err(|source| AgentError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(|source| {
        AgentError::Io {
            path: dir.display().to_string(),
            source,
        }
    })?;
    Ok(())
}

/// Writes `value` to `<dir>/<name>` with mode 0600, returning the path.
pub fn materialize(dir: &Path, name: &str, value: &str) -> AgentResult<PathBuf> {
    ensure_secrets_dir(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, value).map_err(|source| AgentError::Io {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).map_err(|source| {
        AgentError::Io {
            path: path.display().to_string(),
            source,
        }
    })?;
    Ok(path)
}

/// Overwrites the file with zero bytes of the same length, then unlinks it.
/// Best-effort: a failure to zero the content still attempts the unlink.
pub fn zero_and_unlink(path: &Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        let zeros = vec![0u8; metadata.len() as usize];
        if let Err(err) = std::fs::write(path, &zeros) {
            tracing::warn!(path = %path.display(), error = %err, "failed to zero secret file before unlink");
        }
    }
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to unlink secret file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_writes_mode_0600_under_a_0700_directory() {
        let temp = tempfile::tempdir().unwrap();
        let secrets_dir = temp.path().join("secrets");

        let path = materialize(&secrets_dir, "DB_PASSWORD", "hunter2").unwrap();

        let dir_mode = std::fs::metadata(&secrets_dir).unwrap().permissions().mode() & 0o777;
        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hunter2");
    }

    #[test]
    fn zero_and_unlink_removes_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = materialize(temp.path(), "TOKEN", "secret-value").unwrap();

        zero_and_unlink(&path);

        assert!(!path.exists());
    }
}
