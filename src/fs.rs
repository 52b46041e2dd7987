// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::PermissionsConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Whether the process runs with an effective UID of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Random sibling path used for temp files and staging directories.
pub fn sibling_temp_path(path: &Path, tag: &str) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => return Err(Error::InvalidPath(path.to_path_buf())),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    Ok(parent.join(format!(".{}.{}-{:x}", name, tag, random_suffix)))
}

/// Atomically write data to a file using a temporary file and rename.
/// Readers never observe a partially written file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let temp_path = sibling_temp_path(path, "tmp")?;

    let mut file = fs::File::create(&temp_path).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    // Flush to disk before rename
    file.sync_all().map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove a directory tree. A missing tree is not an error.
pub fn remove_tree(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}

/// Owner to apply to generated files: the configured UID/GID when running
/// as root, otherwise none (files stay with the invoking user).
pub fn effective_owner(permissions: &PermissionsConfig) -> Option<(u32, u32)> {
    owner_for(permissions, is_root())
}

fn owner_for(permissions: &PermissionsConfig, is_root: bool) -> Option<(u32, u32)> {
    if is_root {
        Some((permissions.owner_uid, permissions.owner_gid))
    } else {
        None
    }
}

/// Apply directory and file modes to every entry below `root`, and the
/// owner when one is given. `restricted` files get `ca_key_mode` instead
/// of `file_mode`.
pub fn normalize_tree(
    root: &Path,
    permissions: &PermissionsConfig,
    restricted: &[PathBuf],
    owner: Option<(u32, u32)>,
) -> Result<()> {
    let metadata = fs::symlink_metadata(root).map_err(|e| Error::ReadFile {
        path: root.to_path_buf(),
        source: e,
    })?;

    if metadata.is_dir() {
        set_mode(root, permissions.dir_mode)?;
        set_owner(root, owner)?;

        let entries = fs::read_dir(root).map_err(|e| Error::ReadDir {
            path: root.to_path_buf(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::ReadDir {
                path: root.to_path_buf(),
                source: e,
            })?;
            normalize_tree(&entry.path(), permissions, restricted, owner)?;
        }
    } else if metadata.is_file() {
        let mode = if restricted.iter().any(|p| p == root) {
            permissions.ca_key_mode
        } else {
            permissions.file_mode
        };
        set_mode(root, mode)?;
        set_owner(root, owner)?;
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::Permissions {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_owner(path: &Path, owner: Option<(u32, u32)>) -> Result<()> {
    if let Some((uid, gid)) = owner {
        std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|e| Error::Permissions {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_owner(_path: &Path, _owner: Option<(u32, u32)>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.pem");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sibling_temp_path_for_relative_name() {
        let temp = sibling_temp_path(Path::new("ssl"), "staging").unwrap();
        assert_eq!(temp.parent(), Some(Path::new(".")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".ssl.staging-"));
    }

    #[test]
    fn test_remove_tree_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_tree(&dir.path().join("absent")).unwrap());

        let present = dir.path().join("present");
        fs::create_dir_all(present.join("nested")).unwrap();
        assert!(remove_tree(&present).unwrap());
        assert!(!present.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_tree_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ssl");
        let nested = root.join("redis");
        fs::create_dir_all(&nested).unwrap();
        let cert = nested.join("redis.crt");
        let key = root.join("ca.key");
        fs::write(&cert, "cert").unwrap();
        fs::write(&key, "key").unwrap();
        fs::set_permissions(&cert, fs::Permissions::from_mode(0o600)).unwrap();

        normalize_tree(&root, &PermissionsConfig::default(), &[key.clone()], None).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode(&root), 0o755);
        assert_eq!(mode(&nested), 0o755);
        assert_eq!(mode(&cert), 0o644);
        assert_eq!(mode(&key), 0o600);
    }

    #[test]
    fn test_owner_only_applied_as_root() {
        let permissions = PermissionsConfig {
            owner_uid: 1001,
            owner_gid: 1002,
            ..PermissionsConfig::default()
        };

        assert_eq!(owner_for(&permissions, true), Some((1001, 1002)));
        assert_eq!(owner_for(&permissions, false), None);
        assert_eq!(
            owner_for(&PermissionsConfig::default(), true),
            Some((1000, 1000))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_tree_sets_owner() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ssl");
        let nested = root.join("minio");
        fs::create_dir_all(&nested).unwrap();
        let key = nested.join("minio.key");
        fs::write(&key, "key").unwrap();

        // Chowning to our own ids needs no privileges
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        normalize_tree(&root, &PermissionsConfig::default(), &[], Some((uid, gid))).unwrap();

        for path in [&root, &nested, &key] {
            let metadata = fs::metadata(path).unwrap();
            assert_eq!(metadata.uid(), uid);
            assert_eq!(metadata.gid(), gid);
        }
    }
}
