// crates/core/src/refresh_intent.rs
//! `.intent` / `.inprogress` files, PID-liveness checks (spec §4.4).
//!
//! Filesystem-only coordination by design (spec §9 "Filesystem-only
//! coordination"): no in-memory mutex, no network RPC. A crashed holder of
//! `.inprogress` leaves no cleanup obligation — the next caller's liveness
//! probe (`pid_liveness::is_pid_alive`) discovers the file is stale and
//! deletes it itself.

use std::path::{Path, PathBuf};

use session_health_types::FreshnessCategory;

use crate::atomic_file::write_atomic;
use crate::freshness::now_ms;
use crate::pid_liveness::{current_pid, is_pid_alive};

fn intent_path(dir: &Path, category: FreshnessCategory) -> PathBuf {
    dir.join(format!("{}.intent", category.as_str()))
}

fn inprogress_path(dir: &Path, category: FreshnessCategory) -> PathBuf {
    dir.join(format!("{}.inprogress", category.as_str()))
}

/// `signalRefreshNeeded(cat)`: write (or overwrite) `<cat>.intent` with a
/// timestamp.
pub fn signal_refresh_needed(dir: &Path, category: FreshnessCategory) {
    let path = intent_path(dir, category);
    let body = now_ms().to_string();
    let _ = write_atomic(&path, body.as_bytes());
}

/// `signalRefreshInProgress(cat)`: write `<cat>.inprogress` with the
/// caller's PID.
pub fn signal_refresh_in_progress(dir: &Path, category: FreshnessCategory) {
    let path = inprogress_path(dir, category);
    let body = current_pid().to_string();
    let _ = write_atomic(&path, body.as_bytes());
}

fn read_inprogress_pid(dir: &Path, category: FreshnessCategory) -> Option<u32> {
    let path = inprogress_path(dir, category);
    let bytes = std::fs::read_to_string(&path).ok()?;
    bytes.trim().parse().ok()
}

/// `isRefreshInProgress(cat)`: true if the inprogress file names a live
/// PID. If the PID cannot be signaled, the file is deleted and `false` is
/// returned (spec invariant 5: dead-PID auto-expiry).
pub fn is_refresh_in_progress(dir: &Path, category: FreshnessCategory) -> bool {
    let Some(pid) = read_inprogress_pid(dir, category) else {
        return false;
    };
    if is_pid_alive(pid) {
        true
    } else {
        let _ = std::fs::remove_file(inprogress_path(dir, category));
        false
    }
}

/// Age in ms of the pending intent file for `category`, if one exists.
pub fn intent_age_ms(dir: &Path, category: FreshnessCategory) -> Option<i64> {
    let path = intent_path(dir, category);
    let raw = std::fs::read_to_string(&path).ok()?;
    let ts: i64 = raw.trim().parse().ok()?;
    Some((now_ms() - ts).max(0))
}

/// `clearIntent(cat)`: delete both the intent and inprogress files (a
/// successful refresh needs no further signal).
pub fn clear_intent(dir: &Path, category: FreshnessCategory) {
    let _ = std::fs::remove_file(intent_path(dir, category));
    let _ = std::fs::remove_file(inprogress_path(dir, category));
}

/// `clearInProgress(cat)`: delete only the inprogress file, leaving the
/// intent in place so another process retries.
pub fn clear_in_progress(dir: &Path, category: FreshnessCategory) {
    let _ = std::fs::remove_file(inprogress_path(dir, category));
}

/// List categories with a pending `.intent` file anywhere under `dir`
/// (used by the telemetry dashboard, spec §4.14 step 4).
pub fn pending_intent_categories(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.strip_suffix(".intent").map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_then_read_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_refresh_in_progress(dir.path(), FreshnessCategory::Billing));
        signal_refresh_in_progress(dir.path(), FreshnessCategory::Billing);
        assert!(is_refresh_in_progress(dir.path(), FreshnessCategory::Billing));
    }

    #[test]
    fn dead_pid_auto_expires() {
        let dir = tempfile::tempdir().unwrap();
        let path = inprogress_path(dir.path(), FreshnessCategory::Billing);
        write_atomic(&path, b"999999999").unwrap(); // implausible PID
        assert!(!is_refresh_in_progress(dir.path(), FreshnessCategory::Billing));
        assert!(!path.exists(), "stale inprogress file should be removed");
    }

    #[test]
    fn clear_intent_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        signal_refresh_needed(dir.path(), FreshnessCategory::Git);
        signal_refresh_in_progress(dir.path(), FreshnessCategory::Git);
        clear_intent(dir.path(), FreshnessCategory::Git);
        assert!(!intent_path(dir.path(), FreshnessCategory::Git).exists());
        assert!(!inprogress_path(dir.path(), FreshnessCategory::Git).exists());
    }

    #[test]
    fn clear_in_progress_leaves_intent_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        signal_refresh_needed(dir.path(), FreshnessCategory::Git);
        signal_refresh_in_progress(dir.path(), FreshnessCategory::Git);
        clear_in_progress(dir.path(), FreshnessCategory::Git);
        assert!(intent_path(dir.path(), FreshnessCategory::Git).exists());
        assert!(!inprogress_path(dir.path(), FreshnessCategory::Git).exists());
    }

    #[test]
    fn intent_age_reflects_elapsed_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = intent_path(dir.path(), FreshnessCategory::Git);
        let ts = now_ms() - 10_000;
        write_atomic(&path, ts.to_string().as_bytes()).unwrap();
        let age = intent_age_ms(dir.path(), FreshnessCategory::Git).unwrap();
        assert!(age >= 10_000 && age < 11_000);
    }

    #[test]
    fn pending_categories_lists_intent_stems() {
        let dir = tempfile::tempdir().unwrap();
        signal_refresh_needed(dir.path(), FreshnessCategory::Git);
        signal_refresh_needed(dir.path(), FreshnessCategory::Billing);
        let mut cats = pending_intent_categories(dir.path());
        cats.sort();
        assert_eq!(cats, vec!["billing".to_string(), "git".to_string()]);
    }
}
