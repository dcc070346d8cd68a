// crates/core/src/session_lock.rs
//! `SessionLockStore` — immutable identity record per session (spec §4.5).

use std::path::{Path, PathBuf};

use regex_lite::Regex;
use session_health_types::{SessionLock, SessionLockIdentity, SessionLockMutable, SessionLockUpdate};

use crate::atomic_file::write_json_atomic;
use crate::freshness::now_ms;

/// Session IDs accepted by `SessionLockStore` are validated at the boundary
/// (spec §4.5): `^[A-Za-z0-9_-]+$`. Anything else is rejected outright
/// rather than sanitized — sanitization (spec §4.1) is for filenames that
/// must always produce *something*; this store instead refuses invalid
/// input so the caller can surface the mistake.
pub fn is_valid_session_id(session_id: &str) -> bool {
    static PATTERN: once_lock::OnceLock<Regex> = once_lock::OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
    !session_id.is_empty() && re.is_match(session_id)
}

/// Thin alias so this module doesn't depend on the `once_cell` crate when
/// `std::sync::OnceLock` already does the job (MSRV allowing).
mod once_lock {
    pub use std::sync::OnceLock;
}

#[derive(Debug, Clone)]
pub struct SessionLockStore {
    base_dir: PathBuf,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionLockError {
    #[error("invalid session id")]
    InvalidSessionId,
}

impl SessionLockStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.lock"))
    }

    pub fn read(&self, session_id: &str) -> Option<SessionLock> {
        let bytes = std::fs::read(self.lock_path(session_id)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// `getOrCreate(...)` (spec §4.5): return an existing, parseable lock
    /// unchanged, or create one with `launchedAt == updatedAt == now`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create(
        &self,
        session_id: &str,
        slot_id: &str,
        config_dir: Option<String>,
        keychain_service: Option<String>,
        email: Option<String>,
        transcript_path: &str,
        tmux: Option<String>,
    ) -> Result<SessionLock, SessionLockError> {
        if !is_valid_session_id(session_id) {
            return Err(SessionLockError::InvalidSessionId);
        }

        if let Some(existing) = self.read(session_id) {
            return Ok(existing);
        }

        let now = now_ms();
        let lock = SessionLock {
            identity: SessionLockIdentity {
                session_id: session_id.to_string(),
                launched_at: now,
                slot_id: slot_id.to_string(),
                config_dir,
                keychain_service,
                email,
                transcript_path: transcript_path.to_string(),
                tmux,
            },
            mutable: SessionLockMutable {
                claude_version: None,
                last_version_check: None,
                last_idle_check: None,
                updated_at: now,
                lock_file_version: 1,
            },
        };
        let _ = write_json_atomic(&self.lock_path(session_id), &lock);
        Ok(lock)
    }

    /// `update(sessionId, {...})` (spec §4.5): read, merge only whitelisted
    /// mutable fields, bump `updatedAt`, atomic-write.
    pub fn update(
        &self,
        session_id: &str,
        patch: SessionLockUpdate,
    ) -> Result<Option<SessionLock>, SessionLockError> {
        if !is_valid_session_id(session_id) {
            return Err(SessionLockError::InvalidSessionId);
        }

        let Some(mut lock) = self.read(session_id) else {
            return Ok(None);
        };

        if let Some(v) = patch.claude_version {
            lock.mutable.claude_version = Some(v);
        }
        if let Some(v) = patch.last_version_check {
            lock.mutable.last_version_check = Some(v);
        }
        if let Some(v) = patch.last_idle_check {
            lock.mutable.last_idle_check = Some(v);
        }
        lock.mutable.updated_at = now_ms();

        let _ = write_json_atomic(&self.lock_path(session_id), &lock);
        Ok(Some(lock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_session_ids_outside_whitelist() {
        assert!(!is_valid_session_id("../etc/passwd"));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id(""));
        assert!(is_valid_session_id("abc-123_ok"));
    }

    #[test]
    fn get_or_create_is_idempotent_on_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLockStore::new(dir.path());

        let first = store
            .get_or_create("sess-1", "slot-a", None, None, None, "/tmp/t.jsonl", None)
            .unwrap();
        let second = store
            .get_or_create("sess-1", "slot-b", None, None, None, "/tmp/other.jsonl", None)
            .unwrap();

        assert_eq!(first.identity.launched_at, second.identity.launched_at);
        assert_eq!(second.identity.slot_id, "slot-a", "identity must not change once created");
    }

    #[test]
    fn update_merges_only_whitelisted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLockStore::new(dir.path());
        store
            .get_or_create("sess-2", "slot-a", None, None, None, "/tmp/t.jsonl", None)
            .unwrap();

        let updated = store
            .update(
                "sess-2",
                SessionLockUpdate {
                    claude_version: Some("2.1.0".into()),
                    last_version_check: Some(42),
                    last_idle_check: None,
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.mutable.claude_version.as_deref(), Some("2.1.0"));
        assert_eq!(updated.mutable.last_version_check, Some(42));
        assert_eq!(updated.identity.slot_id, "slot-a");
    }

    #[test]
    fn update_on_missing_lock_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLockStore::new(dir.path());
        let result = store.update("no-such-session", SessionLockUpdate::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn rejects_invalid_id_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLockStore::new(dir.path());
        let err = store.get_or_create("../bad", "s", None, None, None, "/t", None);
        assert!(err.is_err());
    }
}
