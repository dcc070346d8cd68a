// crates/core/src/broker.rs
//! `UnifiedBroker` — the `gatherAll` orchestrator (spec §4.13).
//!
//! Mirrors the teacher's `live::manager` fan-out-then-merge shape, but
//! generalized across three distinct scheduling tiers instead of one flat
//! parallel join: Tier 1 runs inline (pure, no I/O), Tier 2 fans out under a
//! `tokio::task::JoinSet` with a per-source timeout race, and Tier 3 adds a
//! single-flight acquisition step in front of the same race so only one
//! process per stale category actually calls out. `GatherContext` is shared
//! across spawned tasks behind an `Arc` rather than borrowed, since none of
//! the fetch futures are guaranteed to finish before `gather_all` returns
//! the borrow (a timed-out task is abandoned, not awaited to completion).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use session_health_types::{FreshnessCategory, FreshnessStatus, HealthStatus, SessionHealth, Tier};

use crate::freshness::{self, now_ms};
use crate::gather_context::GatherContext;
use crate::global_cache::GlobalCacheStore;
use crate::single_flight::SingleFlight;
use crate::source_registry::{DataSourceDescriptor, FetchOutcome, SourceRegistry};

/// One source's outcome, kept for the debug snapshot (spec §4.14 step 2).
pub struct SourceRunRecord {
    pub id: String,
    pub tier: Tier,
    pub outcome_label: &'static str,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Everything one `gatherAll` invocation produced, beyond the health record
/// itself — the orchestrator's own bookkeeping (spec §4.14 step 2's debug
/// snapshot draws from this).
pub struct GatherOutcome {
    pub health: SessionHealth,
    pub runs: Vec<SourceRunRecord>,
}

/// Orchestrates one `gatherAll` invocation over a fixed `SourceRegistry`
/// (spec §4.13, §4.7).
pub struct UnifiedBroker {
    registry: SourceRegistry,
}

impl UnifiedBroker {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }

    /// Run Tier 1 (sequential), Tier 2 (parallel, per-source timeout), and
    /// Tier 3 (single-flight, global-cache-backed) in order, then apply the
    /// shared post-processing pass (spec §4.13 step 6).
    pub async fn gather_all(
        &self,
        ctx: Arc<GatherContext>,
        cache: &GlobalCacheStore,
        single_flight: &SingleFlight,
    ) -> GatherOutcome {
        let mut health = SessionHealth::default();
        health.session_id = ctx.session_id.clone();
        health.project_path = ctx.project_path.clone();
        health.transcript_path = ctx.transcript_path.display().to_string();
        health.gathered_at = now_ms();
        if let Some(existing) = &ctx.existing_health {
            health.first_seen = existing.first_seen;
        }
        if health.first_seen == 0 {
            health.first_seen = health.gathered_at;
        }
        health.session_duration_ms = (health.gathered_at - health.first_seen).max(0);

        let mut runs = Vec::new();

        self.run_tier1(&ctx, &mut health, &mut runs).await;
        self.run_tier2(&ctx, &mut health, &mut runs).await;
        self.run_tier3(&ctx, &mut health, &mut runs, cache, single_flight).await;

        self.post_process(&ctx, &mut health);

        GatherOutcome { health, runs }
    }

    /// Step 3: Tier 1, in registration order, inline.
    async fn run_tier1(&self, ctx: &GatherContext, health: &mut SessionHealth, runs: &mut Vec<SourceRunRecord>) {
        for descriptor in self.registry.get_by_tier(Tier::One) {
            let started = std::time::Instant::now();
            let outcome = descriptor.fetch(ctx).await;
            record_and_merge(descriptor.as_ref(), outcome, health, runs, started.elapsed());
        }
    }

    /// Step 4: Tier 2, fanned out under a `JoinSet`, each task racing its
    /// own `min(timeoutMs, deadlineRemaining)`; merges are applied back in
    /// registration order once every task has resolved, so a fast source
    /// can never observe a slow sibling's half-applied merge.
    async fn run_tier2(&self, ctx: &Arc<GatherContext>, health: &mut SessionHealth, runs: &mut Vec<SourceRunRecord>) {
        let descriptors = self.registry.get_by_tier(Tier::Two);
        let results = race_descriptors(ctx, &descriptors).await;

        for descriptor in descriptors {
            if let Some((outcome, elapsed)) = results.get(descriptor.id()) {
                record_and_merge(descriptor.as_ref(), outcome.clone(), health, runs, *elapsed);
            }
        }
    }

    /// Step 5: Tier 3, single-flight-gated, global-cache-backed.
    async fn run_tier3(
        &self,
        ctx: &Arc<GatherContext>,
        health: &mut SessionHealth,
        runs: &mut Vec<SourceRunRecord>,
        cache: &GlobalCacheStore,
        single_flight: &SingleFlight,
    ) {
        let descriptors = self.registry.get_by_tier(Tier::Three);
        if descriptors.is_empty() {
            return;
        }

        let now = now_ms();
        let snapshot = cache.read();

        let mut stale_by_category: std::collections::HashMap<FreshnessCategory, Vec<Arc<dyn DataSourceDescriptor>>> =
            std::collections::HashMap::new();
        for descriptor in &descriptors {
            let fetched_at = snapshot.entries.get(descriptor.id()).map(|e| e.fetched_at).unwrap_or(0);
            let verdict = freshness::status(fetched_at, descriptor.freshness_category(), now);
            if verdict != FreshnessStatus::Fresh {
                stale_by_category
                    .entry(descriptor.freshness_category())
                    .or_default()
                    .push(descriptor.clone());
            }
        }

        let stale_categories: Vec<FreshnessCategory> = stale_by_category.keys().copied().collect();
        let won_categories = single_flight.try_acquire_many(&stale_categories);

        let mut refreshable = Vec::new();
        for category in &won_categories {
            if let Some(descs) = stale_by_category.get(category) {
                refreshable.extend(descs.iter().cloned());
            }
        }

        let refresh_results = race_descriptors(ctx, &refreshable).await;

        let mut fresh_entries = BTreeMap::new();
        for descriptor in &refreshable {
            if let Some((FetchOutcome::Ok(data), _)) = refresh_results.get(descriptor.id()) {
                fresh_entries.insert(descriptor.id().to_string(), data.clone());
            }
        }
        if !fresh_entries.is_empty() {
            cache.update(fresh_entries, now_ms());
        }

        for category in &won_categories {
            let succeeded = stale_by_category
                .get(category)
                .map(|descs| {
                    descs
                        .iter()
                        .any(|d| matches!(refresh_results.get(d.id()), Some((FetchOutcome::Ok(_), _))))
                })
                .unwrap_or(false);
            single_flight.release(*category, succeeded);
            freshness::record_fetch(&ctx.config.cooldowns_dir(), *category, succeeded);
        }

        for descriptor in &refreshable {
            if let Some((outcome, elapsed)) = refresh_results.get(descriptor.id()) {
                runs.push(SourceRunRecord {
                    id: descriptor.id().to_string(),
                    tier: descriptor.tier(),
                    outcome_label: outcome_label(outcome),
                    error: outcome.error_label().map(str::to_string),
                    duration_ms: elapsed.as_millis() as u64,
                });
            }
        }

        // Re-merge-from-cache pass: every Tier-3 descriptor merges whatever
        // the cache holds now (freshly written above, or contributed by
        // another process's concurrent gather), annotated with its own
        // staleness verdict and the entry's real `fetchedAt` so `merge` can
        // set e.g. `weekly.stale`/`billing.lastFetched` correctly instead of
        // stamping the data as fresh just because a merge happened to run.
        let merged_snapshot = cache.read();
        for descriptor in &descriptors {
            let Some(entry) = merged_snapshot.entries.get(descriptor.id()) else {
                continue;
            };
            let verdict = freshness::status(entry.fetched_at, descriptor.freshness_category(), now_ms());
            let mut data = entry.data.clone();
            if let serde_json::Value::Object(map) = &mut data {
                map.insert("stale".to_string(), serde_json::Value::Bool(verdict != FreshnessStatus::Fresh));
                map.insert("fetchedAt".to_string(), serde_json::Value::from(entry.fetched_at));
            }
            descriptor.merge(health, data);
        }

        self.register_version_notification(ctx, &merged_snapshot);
    }

    /// `version_check`'s cache entry surfaces through `NotificationStore`
    /// rather than a `SessionHealth` field (spec §3 `NotificationType::
    /// VersionUpdate`); `VersionCheckSource::merge` is a deliberate no-op, so
    /// the broker reads the cache entry directly here instead.
    fn register_version_notification(
        &self,
        ctx: &GatherContext,
        snapshot: &session_health_types::GlobalDataCache,
    ) {
        let Some(entry) = snapshot.entries.get("version_check") else {
            return;
        };
        let update_available = entry
            .data
            .get("updateAvailable")
            .or_else(|| entry.data.get("update_available"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !update_available {
            return;
        }
        let latest = entry
            .data
            .get("latestVersion")
            .or_else(|| entry.data.get("latest_version"))
            .and_then(|v| v.as_str())
            .unwrap_or("a newer version");
        let store = crate::notification_store::NotificationStore::new(ctx.config.notifications_path());
        store.register(
            session_health_types::NotificationType::VersionUpdate,
            &format!("{latest} is available"),
            5,
        );
    }

    /// Step 6: `billing.isFresh`, overall status, transcript-staleness and
    /// data-loss-risk alerts, issues list (spec §4.13 step 6).
    fn post_process(&self, ctx: &GatherContext, health: &mut SessionHealth) {
        let now = now_ms();

        // Invariant 1: `billing.isFresh` is always derived here, never
        // trusted as stored truth from a merged cache entry.
        health.billing.is_fresh =
            freshness::is_fresh(health.billing.last_fetched, FreshnessCategory::Billing, now);

        health.alerts.transcript_stale = health.transcript.exists
            && (now - health.transcript.last_modified) > (ctx.config.transcript_staleness_minutes as i64 * 60_000);

        // `sessionActive(jsonInput)`: the frontend only invokes gatherAll for
        // a session it considers live, so presence of a non-empty session id
        // in the stdin contract is the session-active signal.
        let session_active = ctx.input.session_id.as_deref().is_some_and(|s| !s.is_empty());
        health.alerts.data_loss_risk = health.alerts.transcript_stale && session_active;

        // Stale billing (spec §4.13 step 6's Warning trigger): a prior fetch
        // happened (`lastFetched > 0`) but it has since fallen out of the
        // freshness window. A session that has never fetched billing at all
        // is not "stale", it simply has no billing data yet.
        let billing_stale = health.billing.last_fetched > 0 && !health.billing.is_fresh;

        let mut issues = Vec::new();
        if health.alerts.secrets_detected {
            issues.push("secrets detected in transcript".to_string());
        }
        if health.alerts.transcript_stale {
            issues.push("transcript has gone quiet".to_string());
        }
        if health.context.near_compaction {
            issues.push("context window near compaction".to_string());
        }
        if billing_stale {
            issues.push("billing data is stale".to_string());
        }
        health.issues = issues;

        // No transcript, no billing fetch, and no resolved model: nothing
        // has been gathered at all yet (spec §8 scenario 1), which is
        // `Unknown`, not `Critical` — "transcript is missing" as a Critical
        // trigger (spec §4.13) only applies once a session has otherwise
        // produced data and then lost its transcript.
        let has_any_data = health.transcript.exists
            || health.billing.last_fetched > 0
            || !health.model.value.is_empty();

        health.status = if !has_any_data {
            HealthStatus::Unknown
        } else if !health.transcript.exists || health.alerts.secrets_detected {
            HealthStatus::Critical
        } else if health.alerts.data_loss_risk || health.context.near_compaction || billing_stale {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
    }
}

/// Spawn one timed fetch per descriptor under a `JoinSet`, wait for all of
/// them, and return each outcome keyed by descriptor id. `ctx` is cloned
/// (cheap — an `Arc` bump) into each task so the set can outlive any single
/// borrow of the caller's stack frame.
async fn race_descriptors(
    ctx: &Arc<GatherContext>,
    descriptors: &[Arc<dyn DataSourceDescriptor>],
) -> BTreeMap<String, (FetchOutcome<serde_json::Value>, std::time::Duration)> {
    let mut set = tokio::task::JoinSet::new();
    for descriptor in descriptors.iter().cloned() {
        let ctx = Arc::clone(ctx);
        let budget_ms = ctx.source_budget_ms(descriptor.timeout_ms());
        set.spawn(async move {
            let started = std::time::Instant::now();
            let result = tokio::time::timeout(Duration::from_millis(budget_ms), descriptor.fetch(&ctx)).await;
            let outcome = result.unwrap_or(FetchOutcome::Timeout);
            (descriptor.id().to_string(), outcome, started.elapsed())
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        if let Ok((id, outcome, elapsed)) = joined {
            results.insert(id, (outcome, elapsed));
        }
    }
    results
}

fn outcome_label(outcome: &FetchOutcome<serde_json::Value>) -> &'static str {
    match outcome {
        FetchOutcome::Ok(_) => "ok",
        FetchOutcome::Failed(_) => "failed",
        FetchOutcome::Timeout => "timeout",
    }
}

fn record_and_merge(
    descriptor: &dyn DataSourceDescriptor,
    outcome: FetchOutcome<serde_json::Value>,
    health: &mut SessionHealth,
    runs: &mut Vec<SourceRunRecord>,
    elapsed: std::time::Duration,
) {
    runs.push(SourceRunRecord {
        id: descriptor.id().to_string(),
        tier: descriptor.tier(),
        outcome_label: outcome_label(&outcome),
        error: outcome.error_label().map(str::to_string),
        duration_ms: elapsed.as_millis() as u64,
    });
    if let FetchOutcome::Ok(data) = outcome {
        descriptor.merge(health, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use session_health_types::{BrokerConfig, FreshnessCategory};

    struct InstantSource(&'static str, Tier, FreshnessCategory);

    #[async_trait]
    impl DataSourceDescriptor for InstantSource {
        fn id(&self) -> &str {
            self.0
        }
        fn tier(&self) -> Tier {
            self.1
        }
        fn freshness_category(&self) -> FreshnessCategory {
            self.2
        }
        fn timeout_ms(&self) -> u64 {
            1_000
        }
        async fn fetch(&self, _ctx: &GatherContext) -> FetchOutcome<serde_json::Value> {
            FetchOutcome::Ok(serde_json::json!({ "value": self.0 }))
        }
        fn merge(&self, health: &mut SessionHealth, data: serde_json::Value) {
            health.model.value = data["value"].as_str().unwrap_or_default().to_string();
        }
    }

    fn test_ctx(dir: &std::path::Path) -> Arc<GatherContext> {
        test_ctx_with_input(dir, crate::gather_context::BrokerInput::default())
    }

    fn test_ctx_with_input(dir: &std::path::Path, input: crate::gather_context::BrokerInput) -> Arc<GatherContext> {
        Arc::new(GatherContext::new(
            "s1".into(),
            dir.join("t.jsonl"),
            dir.display().to_string(),
            BrokerConfig::resolve(Some(dir.to_path_buf())),
            input,
            None,
        ))
    }

    #[tokio::test]
    async fn gather_all_runs_every_tier_and_merges() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(InstantSource("tier1", Tier::One, FreshnessCategory::Model)));
        registry.register(Arc::new(InstantSource("tier2", Tier::Two, FreshnessCategory::Transcript)));

        let broker = UnifiedBroker::new(registry);
        let ctx = test_ctx(dir.path());
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let outcome = broker.gather_all(ctx, &cache, &sf).await;
        assert_eq!(outcome.runs.len(), 2);
        assert_eq!(outcome.health.model.value, "tier2");
        // A model was resolved but the transcript never existed: "transcript
        // missing" fires as a Critical trigger once *some* data is present
        // (spec §4.13), distinct from the all-empty §8 scenario 1 case below.
        assert_eq!(outcome.health.status, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn post_process_unknown_when_nothing_gathered() {
        // spec §8 scenario 1: transcript absent, no caches, no model resolved.
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let broker = UnifiedBroker::new(registry);
        let ctx = test_ctx(dir.path());
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let outcome = broker.gather_all(ctx, &cache, &sf).await;
        assert!(!outcome.health.transcript.exists);
        assert!(!outcome.health.billing.is_fresh);
        assert_eq!(outcome.health.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn post_process_critical_when_transcript_missing_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let broker = UnifiedBroker::new(registry);
        let ctx = test_ctx(dir.path());
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let mut outcome = broker.gather_all(Arc::clone(&ctx), &cache, &sf).await;
        outcome.health.model.value = "claude-sonnet-4".to_string();
        outcome.health.transcript.exists = false;
        broker.post_process(&ctx, &mut outcome.health);
        assert_eq!(outcome.health.status, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn post_process_warning_on_data_loss_risk() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let broker = UnifiedBroker::new(registry);
        let input = crate::gather_context::BrokerInput {
            session_id: Some("s1".into()),
            ..Default::default()
        };
        let ctx = test_ctx_with_input(dir.path(), input);
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let mut outcome = broker.gather_all(Arc::clone(&ctx), &cache, &sf).await;
        outcome.health.transcript.exists = true;
        outcome.health.transcript.last_modified = now_ms() - 20 * 60_000;
        broker.post_process(&ctx, &mut outcome.health);
        assert!(outcome.health.alerts.transcript_stale);
        assert!(outcome.health.alerts.data_loss_risk);
        assert_eq!(outcome.health.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn post_process_warning_on_stale_billing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let broker = UnifiedBroker::new(registry);
        let ctx = test_ctx(dir.path());
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let mut outcome = broker.gather_all(Arc::clone(&ctx), &cache, &sf).await;
        outcome.health.transcript.exists = true;
        outcome.health.billing.last_fetched = now_ms() - 10 * 60_000; // older than billing's 120s fresh window
        broker.post_process(&ctx, &mut outcome.health);
        assert!(!outcome.health.billing.is_fresh);
        assert_eq!(outcome.health.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn post_process_healthy_when_everything_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let broker = UnifiedBroker::new(registry);
        let ctx = test_ctx(dir.path());
        let cache = GlobalCacheStore::new(dir.path().join("data-cache.json"));
        let sf = SingleFlight::new(dir.path().join("refresh-intents"));

        let mut outcome = broker.gather_all(Arc::clone(&ctx), &cache, &sf).await;
        outcome.health.transcript.exists = true;
        outcome.health.transcript.last_modified = now_ms();
        outcome.health.billing.last_fetched = now_ms();
        broker.post_process(&ctx, &mut outcome.health);
        assert_eq!(outcome.health.status, HealthStatus::Healthy);
    }
}
