// crates/core/src/single_flight.rs
//! Acquire/release adapter over `RefreshIntentStore` (spec §4.4).
//!
//! Composite lock type whose acquisition is non-blocking and PID-stamped
//! (spec §9 "Concurrency rewrite"): `tryAcquire` never waits — it either
//! wins the inprogress file immediately or reports someone else already
//! holds it. This is the thundering-herd defense (spec §5 "Backpressure
//! and storms"): when 30 sessions notice the same stale category, exactly
//! one of them observes `acquired: true`.

use std::path::{Path, PathBuf};

use session_health_types::FreshnessCategory;

use crate::refresh_intent::{
    clear_in_progress, clear_intent, is_refresh_in_progress, signal_refresh_in_progress,
    signal_refresh_needed,
};

/// Outcome of `tryAcquire` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    AlreadyInProgress,
}

/// Non-blocking single-flight coordinator scoped to one refresh-intents
/// directory (spec §6 `refresh-intents/`).
#[derive(Debug, Clone)]
pub struct SingleFlight {
    dir: PathBuf,
}

impl SingleFlight {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `tryAcquire(cat)`: signal intent, then either win the inprogress
    /// file or discover a live holder already has it.
    pub fn try_acquire(&self, category: FreshnessCategory) -> AcquireOutcome {
        signal_refresh_needed(&self.dir, category);
        if is_refresh_in_progress(&self.dir, category) {
            return AcquireOutcome::AlreadyInProgress;
        }
        signal_refresh_in_progress(&self.dir, category);
        AcquireOutcome::Acquired
    }

    /// `release(cat, success)`: clear both files on success, or only the
    /// inprogress marker on failure (leaving intent for the next retry).
    pub fn release(&self, category: FreshnessCategory, success: bool) {
        if success {
            clear_intent(&self.dir, category);
        } else {
            clear_in_progress(&self.dir, category);
        }
    }

    /// `tryAcquireMany(cats)`: the acquired subset; callers must release
    /// exactly this set, not the original request.
    pub fn try_acquire_many(&self, categories: &[FreshnessCategory]) -> Vec<FreshnessCategory> {
        categories
            .iter()
            .copied()
            .filter(|c| self.try_acquire(*c) == AcquireOutcome::Acquired)
            .collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 "Single-flight": across N concurrent callers, exactly one wins;
    /// after release another caller can succeed.
    #[test]
    fn exactly_one_acquires_then_release_frees_it() {
        let dir = tempfile::tempdir().unwrap();
        let sf = SingleFlight::new(dir.path());

        let first = sf.try_acquire(FreshnessCategory::Billing);
        let second = sf.try_acquire(FreshnessCategory::Billing);
        assert_eq!(first, AcquireOutcome::Acquired);
        assert_eq!(second, AcquireOutcome::AlreadyInProgress);

        sf.release(FreshnessCategory::Billing, true);

        let third = sf.try_acquire(FreshnessCategory::Billing);
        assert_eq!(third, AcquireOutcome::Acquired);
    }

    #[test]
    fn failed_release_leaves_intent_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let sf = SingleFlight::new(dir.path());
        sf.try_acquire(FreshnessCategory::Git);
        sf.release(FreshnessCategory::Git, false);
        assert!(dir.path().join("git.intent").exists());
        assert!(!dir.path().join("git.inprogress").exists());
    }

    #[test]
    fn try_acquire_many_returns_only_the_won_subset() {
        let dir = tempfile::tempdir().unwrap();
        let sf = SingleFlight::new(dir.path());
        sf.try_acquire(FreshnessCategory::Git); // pre-occupy git

        let won = sf.try_acquire_many(&[FreshnessCategory::Git, FreshnessCategory::Billing]);
        assert_eq!(won, vec![FreshnessCategory::Billing]);
    }
}
