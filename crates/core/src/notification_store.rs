// crates/core/src/notification_store.rs
//! `NotificationStore` — intermittent display cycle (spec §4.12).

use session_health_types::{NotificationRecord, NotificationStoreFile, NotificationType};

use crate::atomic_file::{read_or_default, write_json_atomic};
use crate::freshness::now_ms;
use std::path::Path;

/// Show window (spec §4.12 "show 30s, hide 5min, repeat").
pub const SHOW_MS: i64 = 30_000;
pub const HIDE_MS: i64 = 5 * 60_000;
/// Total cycle length before a notification becomes ready-to-show again.
pub const CYCLE_MS: i64 = SHOW_MS + HIDE_MS;
/// Entries older than this, once dismissed, are pruned (spec §4.12 cleanup).
pub const DISMISSED_RETENTION_MS: i64 = 24 * 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPhase {
    ReadyToShow,
    Showing,
    Hiding,
}

/// Phase of the show/hide cycle for a notification relative to `now`
/// (spec §4.12).
pub fn display_phase(last_shown_at: Option<i64>, now: i64) -> DisplayPhase {
    let Some(last_shown_at) = last_shown_at else {
        return DisplayPhase::ReadyToShow;
    };
    let elapsed = (now - last_shown_at).max(0);
    if elapsed < SHOW_MS {
        DisplayPhase::Showing
    } else if elapsed < CYCLE_MS {
        DisplayPhase::Hiding
    } else {
        DisplayPhase::ReadyToShow
    }
}

pub struct NotificationStore {
    path: std::path::PathBuf,
}

impl NotificationStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_file(&self) -> NotificationStoreFile {
        read_or_default(&self.path, NotificationStoreFile::default())
    }

    fn write_file(&self, file: &NotificationStoreFile) {
        let _ = write_json_atomic(&self.path, file);
    }

    /// `register(type, message, priority)`: upsert and clear `dismissed`.
    pub fn register(&self, kind: NotificationType, message: &str, priority: u8) {
        let mut file = self.read_file();
        let now = now_ms();
        let entry = file.records.entry(kind).or_insert_with(|| NotificationRecord {
            kind,
            message: message.to_string(),
            priority,
            created_at: now,
            last_shown_at: None,
            show_count: 0,
            dismissed: false,
        });
        entry.message = message.to_string();
        entry.priority = priority;
        entry.dismissed = false;
        self.write_file(&file);
    }

    /// `recordShown(type)`: bump `lastShownAt`/`showCount` only when
    /// transitioning into a new show cycle.
    pub fn record_shown(&self, kind: NotificationType) {
        let mut file = self.read_file();
        let now = now_ms();
        if let Some(entry) = file.records.get_mut(&kind) {
            let phase = display_phase(entry.last_shown_at, now);
            if phase == DisplayPhase::ReadyToShow {
                entry.last_shown_at = Some(now);
                entry.show_count += 1;
            }
        }
        self.write_file(&file);
    }

    pub fn dismiss(&self, kind: NotificationType) {
        let mut file = self.read_file();
        if let Some(entry) = file.records.get_mut(&kind) {
            entry.dismissed = true;
        }
        self.write_file(&file);
    }

    /// `getActive()`: non-dismissed, currently-showing notifications sorted
    /// by priority descending.
    pub fn get_active(&self) -> Vec<NotificationRecord> {
        let file = self.read_file();
        let now = now_ms();
        let mut active: Vec<NotificationRecord> = file
            .records
            .into_values()
            .filter(|r| !r.dismissed && display_phase(r.last_shown_at, now) == DisplayPhase::Showing)
            .collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority));
        active
    }

    /// Cleanup: remove entries `dismissed ∧ age > 24h` (spec §4.12).
    pub fn cleanup(&self) {
        let mut file = self.read_file();
        let now = now_ms();
        file.records.retain(|_, r| {
            !(r.dismissed && (now - r.created_at) > DISMISSED_RETENTION_MS)
        });
        self.write_file(&file);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_last_shown_is_ready_to_show() {
        assert_eq!(display_phase(None, 1_000), DisplayPhase::ReadyToShow);
    }

    #[test]
    fn within_30s_is_showing() {
        assert_eq!(display_phase(Some(1_000), 1_000 + 10_000), DisplayPhase::Showing);
    }

    #[test]
    fn between_30s_and_5m30s_is_hiding() {
        assert_eq!(display_phase(Some(0), 60_000), DisplayPhase::Hiding);
    }

    #[test]
    fn after_5m30s_is_ready_again() {
        assert_eq!(display_phase(Some(0), CYCLE_MS + 1), DisplayPhase::ReadyToShow);
    }

    #[test]
    fn register_then_record_shown_then_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path().join("notifications.json"));
        store.register(NotificationType::VersionUpdate, "update available", 5);
        store.record_shown(NotificationType::VersionUpdate);

        let active = store.get_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].show_count, 1);
    }

    #[test]
    fn dismissed_notifications_are_not_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path().join("notifications.json"));
        store.register(NotificationType::SlotSwitch, "slot changed", 3);
        store.record_shown(NotificationType::SlotSwitch);
        store.dismiss(NotificationType::SlotSwitch);

        assert!(store.get_active().is_empty());
    }

    #[test]
    fn active_sorted_by_priority_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path().join("notifications.json"));
        store.register(NotificationType::SlotSwitch, "low", 2);
        store.register(NotificationType::RestartReady, "high", 9);
        store.record_shown(NotificationType::SlotSwitch);
        store.record_shown(NotificationType::RestartReady);

        let active = store.get_active();
        assert_eq!(active[0].kind, NotificationType::RestartReady);
    }

    #[test]
    fn cleanup_prunes_old_dismissed_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        let mut file = NotificationStoreFile::default();
        file.records.insert(
            NotificationType::VersionUpdate,
            NotificationRecord {
                kind: NotificationType::VersionUpdate,
                message: "old".into(),
                priority: 1,
                created_at: now_ms() - DISMISSED_RETENTION_MS - 1,
                last_shown_at: None,
                show_count: 1,
                dismissed: true,
            },
        );
        file.records.insert(
            NotificationType::SlotSwitch,
            NotificationRecord {
                kind: NotificationType::SlotSwitch,
                message: "recent".into(),
                priority: 1,
                created_at: now_ms(),
                last_shown_at: None,
                show_count: 0,
                dismissed: true,
            },
        );
        crate::atomic_file::write_json_atomic(&path, &file).unwrap();

        let store = NotificationStore::new(path);
        store.cleanup();
        let remaining = store.read_file();
        assert!(!remaining.records.contains_key(&NotificationType::VersionUpdate));
        assert!(remaining.records.contains_key(&NotificationType::SlotSwitch));
    }
}
