// crates/core/src/freshness.rs
//! Category table -> staleness verdicts and cooldown state (spec §4.3).

use session_health_types::{FreshnessCategory, FreshnessStatus};

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// `(freshMs, cooldownMs, staleMs)` thresholds for one category (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct CategoryThresholds {
    pub fresh_ms: i64,
    pub cooldown_ms: i64,
    pub stale_ms: Option<i64>,
}

const fn t(fresh_ms: i64, cooldown_ms: i64, stale_ms: Option<i64>) -> CategoryThresholds {
    CategoryThresholds {
        fresh_ms,
        cooldown_ms,
        stale_ms,
    }
}

/// Static category -> thresholds table (spec §4.3 "representative values").
pub fn thresholds(category: FreshnessCategory) -> CategoryThresholds {
    match category {
        FreshnessCategory::Billing => t(120_000, 120_000, Some(600_000)),
        FreshnessCategory::LocalCost => t(300_000, 120_000, None),
        FreshnessCategory::Quota => t(60_000, 60_000, Some(300_000)),
        FreshnessCategory::Git => t(30_000, 30_000, Some(300_000)),
        FreshnessCategory::Transcript => t(300_000, 60_000, Some(600_000)),
        FreshnessCategory::Model => t(300_000, 60_000, None),
        FreshnessCategory::Secrets => t(300_000, 60_000, None),
        FreshnessCategory::Context => t(5_000, 5_000, None),
        FreshnessCategory::Version => t(4 * 3_600_000, 3_600_000, None),
        FreshnessCategory::WeeklyQuota => t(300_000, 120_000, Some(24 * 3_600_000)),
        FreshnessCategory::Cleanup => t(24 * 3_600_000, 24 * 3_600_000, None),
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Age in ms of a timestamp (spec §4.3 `age(ts)`). Timestamps `<= 0` are
/// treated as "unknown" by callers, not negative-age.
pub fn age_ms(ts: i64, now: i64) -> i64 {
    (now - ts).max(0)
}

/// `isFresh(ts, category)` (spec §4.3, invariant 6 & universal invariant).
pub fn is_fresh(ts: i64, category: FreshnessCategory, now: i64) -> bool {
    status(ts, category, now) == FreshnessStatus::Fresh
}

/// `status(ts, category)` (spec §4.3, invariant 6). Total function;
/// monotonic in age within a fixed category.
pub fn status(ts: i64, category: FreshnessCategory, now: i64) -> FreshnessStatus {
    if ts <= 0 {
        return FreshnessStatus::Unknown;
    }
    let age = age_ms(ts, now);
    let th = thresholds(category);
    if age < th.fresh_ms {
        FreshnessStatus::Fresh
    } else if let Some(stale_ms) = th.stale_ms {
        if age < stale_ms {
            FreshnessStatus::Stale
        } else {
            FreshnessStatus::Critical
        }
    } else {
        FreshnessStatus::Stale
    }
}

/// Inputs a caller has on hand when asking for the context-aware
/// indicator (spec §4.3): whether there's a pending refresh intent (and
/// its age), and whether the category is in cooldown.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorContext {
    pub intent_age_ms: Option<i64>,
    pub in_cooldown: bool,
}

/// Context-aware indicator glyph (spec §4.3, §5 "Backpressure and storms",
/// §8 "Context-aware indicator" property).
pub fn context_aware_indicator(
    ts: i64,
    category: FreshnessCategory,
    now: i64,
    ctx: IndicatorContext,
) -> &'static str {
    let verdict = status(ts, category, now);

    if verdict == FreshnessStatus::Fresh {
        return "";
    }
    if verdict == FreshnessStatus::Critical {
        return "\u{1f53a}"; // 🔺
    }
    if let Some(intent_age) = ctx.intent_age_ms {
        if intent_age > 5 * 60_000 {
            return "\u{1f53a}"; // 🔺
        }
        if intent_age > 30_000 {
            return "\u{26a0}"; // ⚠
        }
        // Intent younger than 30s: assume the owning process will land it soon.
        return "";
    }
    if ctx.in_cooldown {
        return "\u{26a0}"; // ⚠
    }
    // stale, no intent, no cooldown: assume next daemon run handles it.
    ""
}

/// Path to a category's cooldown marker file: `cooldowns/fm-<category>.cooldown`.
pub fn cooldown_path(cooldowns_dir: &Path, category: FreshnessCategory) -> std::path::PathBuf {
    cooldowns_dir.join(format!("fm-{}.cooldown", category.as_str()))
}

/// `recordFetch(category, success)` (spec §4.3): touch the cooldown file on
/// failure, delete it on success.
pub fn record_fetch(cooldowns_dir: &Path, category: FreshnessCategory, success: bool) {
    let path = cooldown_path(cooldowns_dir, category);
    if success {
        let _ = std::fs::remove_file(&path);
    } else {
        let _ = crate::atomic_file::write_atomic(&path, b"");
    }
}

/// `shouldRefetch(category)` (spec §4.3): true if the cooldown file is
/// absent, or its mtime is older than the category's cooldown window.
pub fn should_refetch(cooldowns_dir: &Path, category: FreshnessCategory) -> bool {
    !is_in_cooldown(cooldowns_dir, category)
}

/// Whether a category is currently within its cooldown window.
pub fn is_in_cooldown(cooldowns_dir: &Path, category: FreshnessCategory) -> bool {
    let path = cooldown_path(cooldowns_dir, category);
    let Some(modified) = mtime_ms(&path) else {
        return false;
    };
    let th = thresholds(category);
    age_ms(modified, now_ms()) < th.cooldown_ms
}

fn mtime_ms(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let ms = modified.duration_since(UNIX_EPOCH).ok()?.as_millis() as i64;
    Some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_for_nonpositive_timestamp() {
        for ts in [-1, 0] {
            assert_eq!(status(ts, FreshnessCategory::Billing, 1000), FreshnessStatus::Unknown);
            assert!(!is_fresh(ts, FreshnessCategory::Billing, 1000));
        }
    }

    #[test]
    fn billing_fresh_then_stale_then_critical() {
        let now = 10_000_000i64;
        let th = thresholds(FreshnessCategory::Billing);
        assert_eq!(status(now, FreshnessCategory::Billing, now), FreshnessStatus::Fresh);
        assert_eq!(
            status(now - th.fresh_ms - 1, FreshnessCategory::Billing, now),
            FreshnessStatus::Stale
        );
        assert_eq!(
            status(now - th.stale_ms.unwrap() - 1, FreshnessCategory::Billing, now),
            FreshnessStatus::Critical
        );
    }

    #[test]
    fn category_without_stale_threshold_never_goes_critical() {
        let now = 10_000_000i64;
        let ancient = now - 1_000_000_000;
        assert_eq!(
            status(ancient, FreshnessCategory::LocalCost, now),
            FreshnessStatus::Stale
        );
    }

    #[test]
    fn status_is_monotonic_in_age() {
        let now = 1_000_000i64;
        let ages = [0, 1_000, 31_000, 121_000, 601_000, 10_000_000];
        let mut prev_rank = -1;
        for age in ages {
            let s = status(now - age, FreshnessCategory::Billing, now);
            let rank = match s {
                FreshnessStatus::Fresh => 0,
                FreshnessStatus::Stale => 1,
                FreshnessStatus::Critical => 2,
                FreshnessStatus::Unknown => unreachable!(),
            };
            assert!(rank >= prev_rank);
            prev_rank = rank;
        }
    }

    #[test]
    fn indicator_fresh_is_silent() {
        let now = 1_000_000i64;
        let ind = context_aware_indicator(now, FreshnessCategory::Billing, now, IndicatorContext::default());
        assert_eq!(ind, "");
    }

    #[test]
    fn indicator_critical_is_always_red() {
        let now = 1_000_000_000i64;
        let ts = 1; // ancient -> critical
        let ind = context_aware_indicator(ts, FreshnessCategory::Billing, now, IndicatorContext::default());
        assert_eq!(ind, "\u{1f53a}");
    }

    #[test]
    fn indicator_overdue_intent_is_red() {
        let now = 1_000_000i64;
        let ts = now - 200_000; // stale, not critical
        let ctx = IndicatorContext {
            intent_age_ms: Some(6 * 60_000),
            in_cooldown: false,
        };
        assert_eq!(context_aware_indicator(ts, FreshnessCategory::Billing, now, ctx), "\u{1f53a}");
    }

    #[test]
    fn indicator_young_overdue_intent_is_warning() {
        let now = 1_000_000i64;
        let ts = now - 200_000;
        let ctx = IndicatorContext {
            intent_age_ms: Some(45_000),
            in_cooldown: false,
        };
        assert_eq!(context_aware_indicator(ts, FreshnessCategory::Billing, now, ctx), "\u{26a0}");
    }

    #[test]
    fn indicator_fresh_intent_is_silent_even_when_stale() {
        let now = 1_000_000i64;
        let ts = now - 200_000;
        let ctx = IndicatorContext {
            intent_age_ms: Some(10_000),
            in_cooldown: false,
        };
        assert_eq!(context_aware_indicator(ts, FreshnessCategory::Billing, now, ctx), "");
    }

    #[test]
    fn indicator_cooldown_without_intent_is_warning() {
        let now = 1_000_000i64;
        let ts = now - 200_000;
        let ctx = IndicatorContext {
            intent_age_ms: None,
            in_cooldown: true,
        };
        assert_eq!(context_aware_indicator(ts, FreshnessCategory::Billing, now, ctx), "\u{26a0}");
    }

    #[test]
    fn indicator_stale_no_intent_no_cooldown_is_silent() {
        let now = 1_000_000i64;
        let ts = now - 200_000;
        let ctx = IndicatorContext::default();
        assert_eq!(context_aware_indicator(ts, FreshnessCategory::Billing, now, ctx), "");
    }

    #[test]
    fn record_fetch_failure_then_success_clears_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        record_fetch(dir.path(), FreshnessCategory::Billing, false);
        assert!(is_in_cooldown(dir.path(), FreshnessCategory::Billing));
        record_fetch(dir.path(), FreshnessCategory::Billing, true);
        assert!(!is_in_cooldown(dir.path(), FreshnessCategory::Billing));
    }

    #[test]
    fn should_refetch_true_when_no_cooldown_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(should_refetch(dir.path(), FreshnessCategory::Git));
    }
}
