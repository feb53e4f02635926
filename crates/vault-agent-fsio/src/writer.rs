//! Atomic write-rename-cleanup procedure.

use std::path::{Path, PathBuf};

use tracing::{instrument, warn};
use vault_agent_common::{AgentError, AgentResult, FileMode};

use crate::path_safety::validate_destination;

/// Writes files such that the destination either holds the prior complete
/// byte sequence or the new one, never a partial write.
pub struct AtomicWriter;

impl AtomicWriter {
    /// Write `bytes` to `path`, guaranteeing atomicity.
    ///
    /// Procedure: ensure the parent directory exists (mode 0755), write to
    /// a sibling temp file named `.<base>.<pid>.tmp`, apply `mode` to the
    /// temp file, optionally `chown` it (non-fatal on failure), then rename
    /// into place.
    #[instrument(skip(bytes), fields(path = %path.display()))]
    pub fn write(path: &Path, bytes: &[u8], mode: &FileMode, owner: Option<&str>) -> AgentResult<PathBuf> {
        validate_destination(path)?;

        let parent = path.parent().ok_or_else(|| {
            AgentError::UnsafePath(format!("destination has no parent: {}", path.display()))
        })?;
        ensure_parent_dir(parent)?;

        let temp_path = temp_path_for(path);
        write_file(&temp_path, bytes)?;
        apply_mode(&temp_path, mode)?;

        if let Some(owner) = owner {
            if let Err(err) = apply_owner(&temp_path, owner) {
                warn!(path = %temp_path.display(), owner, error = %err, "chown failed, continuing (non-fatal)");
            }
        }

        rename_into_place(&temp_path, path)?;
        Ok(path.to_path_buf())
    }

    /// Like `write`, but first copies any existing content at `path` to a
    /// `.bak` sibling so the deployer can roll back on a failed reload.
    /// Returns the backup path if one was created (i.e. `path` pre-existed).
    #[instrument(skip(bytes), fields(path = %path.display()))]
    pub fn write_with_backup(
        path: &Path,
        bytes: &[u8],
        mode: &FileMode,
        owner: Option<&str>,
    ) -> AgentResult<Option<PathBuf>> {
        let backup_path = backup_path_for(path);
        let backup = if path.exists() {
            std::fs::copy(path, &backup_path).map_err(|source| AgentError::Io {
                path: backup_path.display().to_string(),
                source,
            })?;
            Some(backup_path)
        } else {
            None
        };

        Self::write(path, bytes, mode, owner)?;
        Ok(backup)
    }

    /// Restore `path` from its `.bak` sibling, used by the deployer on
    /// rollback after a failed reload or health check.
    #[instrument(fields(path = %path.display()))]
    pub fn restore_backup(path: &Path) -> AgentResult<()> {
        let backup_path = backup_path_for(path);
        std::fs::rename(&backup_path, path).map_err(|source| AgentError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Delete orphaned temp files and aged `.bak` files under each of the
    /// given destination directories. A crash between write and rename
    /// leaves a temp file behind; this prevents them from accumulating.
    /// Returns the number of files removed.
    #[instrument(skip(dirs))]
    pub fn cleanup_orphans(dirs: &[PathBuf]) -> AgentResult<usize> {
        let mut removed = 0usize;
        let bak_cutoff = std::time::Duration::from_secs(24 * 3600);

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(AgentError::Io {
                        path: dir.display().to_string(),
                        source,
                    })
                }
            };

            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let name = file_name.to_string_lossy();

                if is_orphan_temp_file(&name) {
                    if std::fs::remove_file(entry.path()).is_ok() {
                        removed += 1;
                    }
                    continue;
                }

                if name.ends_with(".bak") {
                    if let Some(age) = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .map(|m| m.elapsed().unwrap_or(std::time::Duration::ZERO))
                    {
                        if age > bak_cutoff && std::fs::remove_file(entry.path()).is_ok() {
                            removed += 1;
                        }
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// A temp file name matches `^\.[^/]+\.\d+\.tmp$` — a dotfile, a middle
/// segment (the original basename), a numeric PID, then `.tmp`.
fn is_orphan_temp_file(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('.') else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(".tmp") else {
        return false;
    };
    match rest.rsplit_once('.') {
        Some((_, pid)) => !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    dir.join(format!(".{base}.{}.tmp", std::process::id()))
}

fn backup_path_for(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    dir.join(format!("{base}.bak"))
}

fn ensure_parent_dir(parent: &Path) -> AgentResult<()> {
    if parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|source| AgentError::Io {
        path: parent.display().to_string(),
        source,
    })?;
    apply_mode_to_dir(parent, 0o755)
}

fn apply_mode_to_dir(dir: &Path, mode: u32) -> AgentResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        AgentError::Io {
            path: dir.display().to_string(),
            source,
        }
    })
}

/// Rename `from` onto `to`, then fsync the parent directory so the rename
/// itself is durable across a crash, not just the file's prior write.
fn rename_into_place(from: &Path, to: &Path) -> AgentResult<()> {
    std::fs::rename(from, to).map_err(|source| AgentError::Io {
        path: to.display().to_string(),
        source,
    })?;

    let parent = to.parent().unwrap_or_else(|| Path::new("."));
    let dir = std::fs::File::open(parent).map_err(|source| AgentError::Io {
        path: parent.display().to_string(),
        source,
    })?;
    dir.sync_all().map_err(|source| AgentError::Io {
        path: parent.display().to_string(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> AgentResult<()> {
    std::fs::write(path, bytes).map_err(|source| AgentError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn apply_mode(path: &Path, mode: &FileMode) -> AgentResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let numeric = mode.to_u32()?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(numeric)).map_err(|source| {
        AgentError::Io {
            path: path.display().to_string(),
            source,
        }
    })
}

/// `owner` is a resolved `uid:gid` pair (username/groupname resolution is
/// an external config-layer concern). Failure here is always non-fatal to
/// the caller.
fn apply_owner(path: &Path, owner: &str) -> AgentResult<()> {
    let (uid, gid) = owner
        .split_once(':')
        .and_then(|(u, g)| Some((u.parse::<u32>().ok()?, g.parse::<u32>().ok()?)))
        .ok_or_else(|| AgentError::Configuration(format!("invalid owner spec: {owner}")))?;

    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|source| AgentError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_temp_file_pattern_matches() {
        assert!(is_orphan_temp_file(".web.pem.12345.tmp"));
        assert!(!is_orphan_temp_file("web.pem"));
        assert!(!is_orphan_temp_file(".web.pem.tmp"));
        assert!(!is_orphan_temp_file(".web.pem.abc.tmp"));
    }

    #[test]
    fn write_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("secret.env");
        let mode = FileMode::new("0600");

        AtomicWriter::write(&target, b"hello", &mode, None).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");

        // No leftover temp file.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_with_backup_preserves_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("web.pem");
        let mode = FileMode::new("0600");

        AtomicWriter::write(&target, b"v1", &mode, None).unwrap();
        let backup = AtomicWriter::write_with_backup(&target, b"v2", &mode, None)
            .unwrap()
            .expect("backup should be created for existing file");

        assert_eq!(std::fs::read(&target).unwrap(), b"v2");
        assert_eq!(std::fs::read(&backup).unwrap(), b"v1");

        AtomicWriter::restore_backup(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"v1");
    }

    #[test]
    fn write_with_backup_without_prior_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new.pem");
        let mode = FileMode::new("0600");

        let backup = AtomicWriter::write_with_backup(&target, b"v1", &mode, None).unwrap();
        assert!(backup.is_none());
    }

    #[test]
    fn cleanup_orphans_removes_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = dir.path().join(".web.pem.99999.tmp");
        std::fs::write(&orphan, b"leftover").unwrap();

        let removed = AtomicWriter::cleanup_orphans(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(removed, 1);
        assert!(!orphan.exists());
    }
}
