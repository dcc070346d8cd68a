// crates/core/src/atomic_file.rs
//! Write-temp-then-rename file primitives (spec §4.2).
//!
//! Every hot-path writer in this crate goes through here instead of
//! `std::fs::write` directly, so readers only ever see either the
//! pre-rename or post-rename content (spec invariant 4). The pattern is
//! the same one `claude-view-server`'s `live::manager::save_session_snapshot`
//! uses (`path.with_extension("json.tmp")` + `fs::rename`), generalized
//! with 0600/0700 permissions and directory creation per spec §4.2.

use std::path::{Path, PathBuf};

use crate::error::AtomicWriteError;

#[cfg(unix)]
fn set_private_file_perms(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_private_file_perms(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn ensure_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn ensure_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Temp-file path for a given destination: `<path>.<pid>.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{pid}.tmp"));
    path.with_file_name(name)
}

/// Write `bytes` to `path` atomically: ensure the parent directory exists
/// (mode 0700), write to a pid-qualified temp file (mode 0600), then
/// rename onto `path`. On any error, the temp file is removed and the
/// failure is returned — never panics, never leaves a torn write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AtomicWriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_private_dir(parent).map_err(|source| AtomicWriteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let tmp = temp_path_for(path);
    let write_result = std::fs::write(&tmp, bytes).and_then(|_| set_private_file_perms(&tmp));

    if let Err(source) = write_result {
        let _ = std::fs::remove_file(&tmp);
        return Err(AtomicWriteError::WriteTemp {
            path: tmp,
            source,
        });
    }

    if let Err(source) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(AtomicWriteError::Rename {
            from: tmp,
            to: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Serialize `value` as JSON and write it atomically. Failures are logged
/// by the caller (per spec §7, a failed write is never fatal to the gather).
pub fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), AtomicWriteError> {
    let bytes = serde_json::to_vec_pretty(value).unwrap_or_else(|_| b"{}".to_vec());
    write_atomic(path, &bytes)
}

/// Read and parse `path` as JSON, returning `default` (never propagating a
/// parse or IO error) if the file is missing, unreadable, or malformed.
pub fn read_or_default<T: serde::de::DeserializeOwned>(path: &Path, default: T) -> T {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(default),
        Err(_) => default,
    }
}

/// Read raw bytes, returning `None` on any error (missing, permission,
/// truncated read, etc.) rather than propagating.
pub fn read_bytes_or_none(path: &Path) -> Option<Vec<u8>> {
    std::fs::read(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_atomic_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn write_atomic_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"hello").unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "file.json");
    }

    #[test]
    fn read_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let value: serde_json::Value = read_or_default(&path, serde_json::json!({"a": 1}));
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn read_or_default_on_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"not json").unwrap();
        let value: serde_json::Value = read_or_default(&path, serde_json::json!(null));
        assert_eq!(value, serde_json::json!(null));
    }

    #[test]
    fn round_trip_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &serde_json::json!({"x": 42})).unwrap();
        let value: serde_json::Value = read_or_default(&path, serde_json::json!(null));
        assert_eq!(value["x"], 42);
    }

    #[cfg(unix)]
    #[test]
    fn written_file_has_0600_perms() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");
        write_atomic(&path, b"{}").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    /// Concurrent writers never leave a torn/interleaved file (spec invariant 4
    /// / §8 "Atomic-write" property): the final content must equal one of the
    /// two full payloads, never a mixture.
    #[test]
    fn concurrent_writes_never_tear() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("shared.json"));

        let a = b"A".repeat(50_000);
        let b = b"B".repeat(70_000);

        let path_a = path.clone();
        let a_clone = a.clone();
        let t1 = thread::spawn(move || {
            for _ in 0..20 {
                write_atomic(&path_a, &a_clone).unwrap();
            }
        });
        let path_b = path.clone();
        let b_clone = b.clone();
        let t2 = thread::spawn(move || {
            for _ in 0..20 {
                write_atomic(&path_b, &b_clone).unwrap();
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();

        let content = std::fs::read(path.as_path()).unwrap();
        assert!(content == a || content == b, "content was neither A nor B (torn write)");
    }
}
