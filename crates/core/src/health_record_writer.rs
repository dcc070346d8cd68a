// crates/core/src/health_record_writer.rs
//! `HealthRecordWriter` + Publisher + Telemetry (spec §4.14).
//!
//! Writes the seven artifacts a completed gather produces, in order,
//! each independently best-effort: one failed write never blocks the
//! next (spec §7 "Propagation policy" — the orchestrator's write phase
//! follows the same never-fail contract as the gather itself).

use async_trait::async_trait;
use session_health_types::{
    debug_snapshot::{DataQuality, DebugSnapshot, FetchAttempt, FetchHistory, FreshnessReportEntry},
    telemetry::{
        PublishEntry, PublishFile, SessionSummaryEntry, SessionsSummary, TelemetryDashboard,
        TelemetryDashboardEntry, TelemetryRow,
    },
    BrokerConfig, FreshnessCategory, GlobalDataCache, MergedQuotaCache, SessionHealth,
};

use crate::atomic_file::{read_or_default, write_json_atomic};
use crate::broker::SourceRunRecord;
use crate::cleanup_sweeper;
use crate::freshness::{self, now_ms};
use crate::refresh_intent;

/// Fold `UnifiedBroker::gather_all`'s per-source run records into the
/// ring-buffered fetch history the debug snapshot carries (spec §4.14
/// step 2, `FETCH_HISTORY_CAP` in `debug_snapshot.rs`).
fn runs_to_fetch_history(runs: Vec<SourceRunRecord>, at: i64) -> Vec<FetchAttempt> {
    let mut history = FetchHistory::default();
    for run in runs {
        history.push(FetchAttempt {
            source_id: run.id,
            success: run.outcome_label == "ok",
            duration_ms: run.duration_ms,
            error: run.error,
            at,
        });
    }
    history.into_vec()
}

/// Sessions inactive longer than this are pruned from `publish-health.json`
/// (spec §4.14 step 3).
const PUBLISH_PRUNE_MS: i64 = 3_600_000;
/// Sessions inactive longer than this are pruned from `telemetry.json`
/// (spec §4.14 step 4).
const DASHBOARD_PRUNE_MS: i64 = 2 * 3_600_000;

/// Seam over the embedded telemetry database (spec §4.14 step 5, §6
/// `telemetry.db`). Kept as a trait so `session-health-core` never has to
/// depend on `session-health-db` directly — the daemon binary wires the
/// concrete implementation in, the same way `fetchers.rs` abstracts
/// billing/quota over a trait object.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn insert_row(&self, row: TelemetryRow) -> Result<(), String>;
}

/// A sink that drops every row; used where no database is configured
/// (e.g. tests, or a daemon invocation started with telemetry disabled).
pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn insert_row(&self, _row: TelemetryRow) -> Result<(), String> {
        Ok(())
    }
}

fn data_quality_for(health: &SessionHealth, fetch_failures: usize) -> DataQuality {
    if fetch_failures == 0 {
        DataQuality::Complete
    } else if health.billing.is_fresh || health.transcript.exists {
        DataQuality::Partial
    } else {
        DataQuality::Degraded
    }
}

/// Resolve the timestamp backing each freshness category's verdict.
///
/// Tier-1/2 categories are recomputed fresh on every gather (spec §4.13
/// steps 3-4), so their "last fetched" instant is the gather itself except
/// where `SessionHealth` already tracks a more precise source timestamp
/// (billing, git, transcript). Tier-3 categories that go through the
/// global cache (spec §4.6) read their `fetchedAt` back from
/// `data-cache.json` by the same `sourceId` `sources.rs` registers them
/// under. `Quota` has no registered descriptor (spec §4.17: it is only
/// ever read through the external `merged-quota-cache.json` collaborator
/// file), so it is resolved from that file's own `fetchedAt` instead.
fn timestamp_for(category: FreshnessCategory, config: &BrokerConfig, health: &SessionHealth, cache: &GlobalDataCache) -> i64 {
    match category {
        FreshnessCategory::Billing => health.billing.last_fetched,
        FreshnessCategory::Git => health.git.last_checked,
        FreshnessCategory::Transcript => health.transcript.last_modified,
        FreshnessCategory::LocalCost | FreshnessCategory::Model | FreshnessCategory::Secrets | FreshnessCategory::Context => {
            health.gathered_at
        }
        FreshnessCategory::WeeklyQuota => cache.entries.get("weekly_quota").map(|e| e.fetched_at).unwrap_or(0),
        FreshnessCategory::Version => cache.entries.get("version_check").map(|e| e.fetched_at).unwrap_or(0),
        FreshnessCategory::Quota => {
            let merged: MergedQuotaCache = read_or_default(&config.merged_quota_cache_path(), MergedQuotaCache::default());
            merged.fetched_at
        }
        FreshnessCategory::Cleanup => 0,
    }
}

fn freshness_report(config: &BrokerConfig, health: &SessionHealth, cache: &GlobalDataCache) -> Vec<FreshnessReportEntry> {
    let now = now_ms();
    all_categories()
        .into_iter()
        .filter(|c| *c != FreshnessCategory::Cleanup)
        .map(|category| {
            let ts = timestamp_for(category, config, health, cache);
            FreshnessReportEntry {
                category: category.as_str().to_string(),
                status: freshness::status(ts, category, now),
                age_ms: if ts > 0 { freshness::age_ms(ts, now) } else { -1 },
            }
        })
        .collect()
}

fn active_cooldown_labels(config: &BrokerConfig) -> Vec<String> {
    let dir = config.cooldowns_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let stem = name.strip_suffix(".cooldown")?.strip_prefix("fm-")?;
            let category = all_categories().into_iter().find(|c| c.as_str() == stem)?;
            freshness::is_in_cooldown(&dir, category).then(|| stem.to_string())
        })
        .collect()
}

fn all_categories() -> [FreshnessCategory; 11] {
    [
        FreshnessCategory::Billing,
        FreshnessCategory::LocalCost,
        FreshnessCategory::Quota,
        FreshnessCategory::Git,
        FreshnessCategory::Transcript,
        FreshnessCategory::Model,
        FreshnessCategory::Secrets,
        FreshnessCategory::Context,
        FreshnessCategory::Version,
        FreshnessCategory::WeeklyQuota,
        FreshnessCategory::Cleanup,
    ]
}

fn one_line_rendering(health: &SessionHealth) -> String {
    health
        .formatted_output
        .by_width_class
        .get("single-line")
        .and_then(|lines| lines.first())
        .cloned()
        .unwrap_or_default()
}

/// Writes the per-gather artifacts and runs the periodic cleanup sweep.
pub struct HealthRecordWriter<'a> {
    pub config: &'a BrokerConfig,
}

impl<'a> HealthRecordWriter<'a> {
    pub fn new(config: &'a BrokerConfig) -> Self {
        Self { config }
    }

    /// Step 1: the authoritative per-session record.
    fn write_session_json(&self, health: &SessionHealth) {
        let path = self.config.session_health_path(&health.session_id);
        let _ = write_json_atomic(&path, health);
    }

    /// Step 2: freshness report, fetch history, data-quality verdict.
    fn write_debug_snapshot(&self, health: &SessionHealth, runs: Vec<SourceRunRecord>) {
        let cache: GlobalDataCache = read_or_default(&self.config.data_cache_path(), GlobalDataCache::empty());
        let fetch_history = runs_to_fetch_history(runs, health.gathered_at);
        let failures = fetch_history.iter().filter(|a| !a.success).count();
        let snapshot = DebugSnapshot {
            session_id: health.session_id.clone(),
            gathered_at: health.gathered_at,
            freshness_report: freshness_report(self.config, health, &cache),
            fetch_history,
            pending_intents: refresh_intent::pending_intent_categories(&self.config.refresh_intents_dir()),
            active_cooldowns: active_cooldown_labels(self.config),
            data_quality: Some(data_quality_for(health, failures)),
            extra: Default::default(),
        };
        let path = self.config.session_debug_path(&health.session_id);
        let _ = write_json_atomic(&path, &snapshot);
    }

    /// Step 3: upsert this session into the outbound publish contract,
    /// pruning entries inactive beyond `PUBLISH_PRUNE_MS`.
    fn write_publish_record(&self, health: &SessionHealth) {
        let path = self.config.publish_path();
        let mut file: PublishFile = read_or_default(&path, PublishFile::default());
        let now = now_ms();

        let urgency_score = urgency_score(health);
        let entry = PublishEntry {
            session_id: health.session_id.clone(),
            project_path: health.project_path.clone(),
            status: status_label(health),
            urgency_score,
            last_active_at: health.gathered_at,
        };

        file.sessions.retain(|s| s.session_id != health.session_id);
        file.sessions.push(entry);
        file.sessions.retain(|s| now - s.last_active_at <= PUBLISH_PRUNE_MS);
        file.updated_at = now;

        let _ = write_json_atomic(&path, &file);
    }

    /// Step 4: this session's one-line rendering into the dashboard,
    /// pruning entries inactive beyond `DASHBOARD_PRUNE_MS`.
    fn write_telemetry_dashboard(&self, health: &SessionHealth) {
        let path = self.config.telemetry_dashboard_path();
        let mut file: TelemetryDashboard = read_or_default(&path, TelemetryDashboard::default());
        let cache: GlobalDataCache = read_or_default(&self.config.data_cache_path(), GlobalDataCache::empty());
        let now = now_ms();

        let entry = TelemetryDashboardEntry {
            session_id: health.session_id.clone(),
            one_line: one_line_rendering(health),
            status: status_label(health),
            gathered_at: health.gathered_at,
        };
        file.sessions.retain(|s| s.session_id != health.session_id);
        file.sessions.push(entry);
        file.sessions.retain(|s| now - s.gathered_at <= DASHBOARD_PRUNE_MS);

        file.pending_intents = refresh_intent::pending_intent_categories(&self.config.refresh_intents_dir());
        file.active_cooldowns = active_cooldown_labels(self.config);
        for category in all_categories() {
            if category == FreshnessCategory::Cleanup {
                continue;
            }
            let ts = timestamp_for(category, self.config, health, &cache);
            file.freshness.insert(
                category.as_str().to_string(),
                format!("{:?}", freshness::status(ts, category, now)).to_lowercase(),
            );
        }
        file.updated_at = now;

        let _ = write_json_atomic(&path, &file);
    }

    /// Step 5: one invocation-grained telemetry row, through whatever
    /// `TelemetrySink` the daemon wired in.
    async fn write_telemetry_row(
        &self,
        health: &SessionHealth,
        duration_ms: i64,
        sink: &dyn TelemetrySink,
    ) {
        let row = TelemetryRow {
            id: None,
            session_id: health.session_id.clone(),
            slot_id: None,
            gathered_at: health.gathered_at,
            duration_ms,
            cost_today: health.billing.cost_today,
            status: status_label(health),
            secrets_detected: health.alerts.secrets_detected,
            transcript_stale: health.alerts.transcript_stale,
            data_loss_risk: health.alerts.data_loss_risk,
        };
        if let Err(err) = sink.insert_row(row).await {
            tracing::warn!(session_id = %health.session_id, error = %err, "telemetry row insert failed");
        }
    }

    /// Step 6: global cross-session summary with alert indices.
    fn write_sessions_summary(&self, health: &SessionHealth) {
        let path = self.config.sessions_summary_path();
        let mut file: SessionsSummary = read_or_default(&path, SessionsSummary::default());
        let now = now_ms();

        let entry = SessionSummaryEntry {
            session_id: health.session_id.clone(),
            status: status_label(health),
            gathered_at: health.gathered_at,
            has_secrets: health.alerts.secrets_detected,
            has_data_loss_risk: health.alerts.data_loss_risk,
        };
        file.sessions.retain(|s| s.session_id != health.session_id);
        file.sessions.push(entry);

        file.secret_alert_indices = file
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.has_secrets)
            .map(|(i, _)| i)
            .collect();
        file.data_loss_indices = file
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.has_data_loss_risk)
            .map(|(i, _)| i)
            .collect();
        file.updated_at = now;

        let _ = write_json_atomic(&path, &file);
    }

    /// Step 7: the 24h-cooldown-gated cleanup sweep.
    fn run_cleanup_sweep(&self) {
        let report = cleanup_sweeper::maybe_run(
            &self.config.base_dir,
            &self.config.cooldowns_dir(),
            &self.config.refresh_intents_dir(),
            &self.config.log_path(),
        );
        if let Some(report) = report {
            tracing::info!(
                sessions_removed = report.sessions_removed,
                orphaned_cooldowns_removed = report.orphaned_cooldowns_removed,
                log_rotated = report.log_rotated,
                tmp_files_removed = report.tmp_files_removed,
                stale_intents_removed = report.stale_intents_removed,
                "cleanup sweep ran"
            );
        }
    }

    /// Run all seven write steps in order for one completed gather
    /// (spec §4.14). `health.formattedOutput` should already be populated
    /// by `formatter::format_all` before calling this.
    pub async fn write_all(
        &self,
        health: &SessionHealth,
        runs: Vec<SourceRunRecord>,
        duration_ms: i64,
        sink: &dyn TelemetrySink,
    ) {
        self.write_session_json(health);
        self.write_debug_snapshot(health, runs);
        self.write_publish_record(health);
        self.write_telemetry_dashboard(health);
        self.write_telemetry_row(health, duration_ms, sink).await;
        self.write_sessions_summary(health);
        self.run_cleanup_sweep();
    }
}

fn status_label(health: &SessionHealth) -> String {
    match health.status {
        session_health_types::HealthStatus::Healthy => "healthy",
        session_health_types::HealthStatus::Warning => "warning",
        session_health_types::HealthStatus::Critical => "critical",
        session_health_types::HealthStatus::Unknown => "unknown",
    }
    .to_string()
}

/// Heuristic urgency score for the publish contract: alerts dominate,
/// then budget/context pressure (0..=100, higher is more urgent).
fn urgency_score(health: &SessionHealth) -> u32 {
    if health.alerts.secrets_detected {
        return 100;
    }
    if health.alerts.data_loss_risk {
        return 90;
    }
    if health.context.near_compaction {
        return 60;
    }
    if health.billing.budget_percent_used >= 90 {
        return 50;
    }
    10
}
