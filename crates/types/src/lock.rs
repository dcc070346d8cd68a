//! `SessionLock` — immutable-tail/mutable-head identity record (spec §3).

use serde::{Deserialize, Serialize};

/// Immutable once-written identity tuple (spec §3 "SessionLock").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLockIdentity {
    pub session_id: String,
    pub launched_at: i64,
    pub slot_id: String,
    pub config_dir: Option<String>,
    pub keychain_service: Option<String>,
    pub email: Option<String>,
    pub transcript_path: String,
    pub tmux: Option<String>,
}

/// Mutable tail, updated in place by `SessionLockStore::update` (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLockMutable {
    pub claude_version: Option<String>,
    pub last_version_check: Option<i64>,
    pub last_idle_check: Option<i64>,
    pub updated_at: i64,
    pub lock_file_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLock {
    #[serde(flatten)]
    pub identity: SessionLockIdentity,
    #[serde(flatten)]
    pub mutable: SessionLockMutable,
}

/// Fields a caller may update on an existing lock (spec §4.5 "whitelisted
/// mutable fields").
#[derive(Debug, Clone, Default)]
pub struct SessionLockUpdate {
    pub claude_version: Option<String>,
    pub last_version_check: Option<i64>,
    pub last_idle_check: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_roundtrips_flattened() {
        let lock = SessionLock {
            identity: SessionLockIdentity {
                session_id: "abc".into(),
                launched_at: 1,
                slot_id: "slot-1".into(),
                config_dir: None,
                keychain_service: None,
                email: None,
                transcript_path: "/tmp/t.jsonl".into(),
                tmux: None,
            },
            mutable: SessionLockMutable {
                claude_version: Some("2.1.0".into()),
                last_version_check: Some(2),
                last_idle_check: None,
                updated_at: 3,
                lock_file_version: 1,
            },
        };
        let json = serde_json::to_string(&lock).unwrap();
        let back: SessionLock = serde_json::from_str(&json).unwrap();
        assert_eq!(lock, back);
    }
}
