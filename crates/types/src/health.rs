//! `SessionHealth` and its constituent blocks (spec §3 "Core entities").

use serde::{Deserialize, Serialize};

use crate::enums::{DetectionMethod, HealthStatus, ModelSource, SecretType};

/// Context window usage accounting (spec §3 "context window", invariants 2-3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindow {
    pub window_size: u64,
    pub tokens_used: u64,
    pub tokens_left: u64,
    pub percent_used: u32,
    pub near_compaction: bool,
}

/// Fraction of the context window at which the session is expected to
/// compact history (spec glossary: "Compaction threshold").
pub const COMPACTION_THRESHOLD_FRACTION: f64 = 0.78;
/// `nearCompaction` fires at or above this percent-of-threshold.
pub const NEAR_COMPACTION_PERCENT: u32 = 70;
/// Context window size is clamped to this default when out of range.
pub const DEFAULT_WINDOW_SIZE: u64 = 200_000;
pub const MIN_WINDOW_SIZE: u64 = 10_000;
pub const MAX_WINDOW_SIZE: u64 = 500_000;

impl ContextWindow {
    /// Derive a `ContextWindow` from a raw window size and raw tokens-used
    /// count, applying spec §3 invariants 2 and 3.
    pub fn compute(window_size_raw: u64, tokens_used_raw: u64) -> Self {
        let window_size = if (MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&window_size_raw) {
            window_size_raw
        } else {
            DEFAULT_WINDOW_SIZE
        };

        let tokens_used = if tokens_used_raw > window_size * 3 / 2 {
            window_size
        } else {
            tokens_used_raw
        };

        let compaction_threshold = (window_size as f64 * COMPACTION_THRESHOLD_FRACTION) as u64;
        let tokens_left = (compaction_threshold as i64 - tokens_used as i64).max(0) as u64;
        let percent_used = if compaction_threshold > 0 {
            (((tokens_used as f64 / compaction_threshold as f64) * 100.0).floor() as i64)
                .clamp(0, 100) as u32
        } else {
            0
        };
        let near_compaction = percent_used >= NEAR_COMPACTION_PERCENT;

        Self {
            window_size,
            tokens_used,
            tokens_left,
            percent_used,
            near_compaction,
        }
    }
}

/// Model identity block (spec §3 "model").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub value: String,
    pub source: ModelSource,
    pub confidence: u8,
}

/// Git working-tree state (spec §3 "git").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitState {
    pub branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub dirty: bool,
    pub last_checked: i64,
}

/// Weekly quota block, optional (spec §3 "billing").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBudget {
    pub percent: u32,
    pub remaining_hours: f64,
    pub reset_day: String,
    pub last_modified: i64,
    pub stale: bool,
}

/// Billing / cost / burn-rate block (spec §3 "billing").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Billing {
    pub cost_today: f64,
    pub session_cost: f64,
    pub burn_rate_per_hour: f64,
    pub budget_remaining_minutes: f64,
    pub budget_percent_used: u32,
    pub reset_time: Option<i64>,
    pub weekly: Option<WeeklyBudget>,
    pub total_tokens: u64,
    pub tokens_per_minute: f64,
    pub last_fetched: i64,
    /// Derived, never stored-truth (spec invariant 1): recomputed by
    /// `FreshnessAuthority` immediately after every gather.
    pub is_fresh: bool,
}

/// One detected secret occurrence (spec §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFinding {
    pub kind: SecretType,
    pub truncated_sample: String,
}

/// Alert block (spec §3 "alerts").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerts {
    pub secrets_detected: bool,
    pub secrets: Vec<SecretFinding>,
    pub transcript_stale: bool,
    pub data_loss_risk: bool,
}

/// Transcript presence/state (spec §3 "transcript state").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptState {
    pub exists: bool,
    pub size: u64,
    pub last_modified: i64,
    pub message_count: u64,
    pub last_message_preview: String,
    pub is_synced: bool,
}

/// Launch context (spec §3 "launch context").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContext {
    pub auth_profile: Option<String>,
    pub detection_method: DetectionMethod,
    pub config_dir: Option<String>,
    pub keychain_service: Option<String>,
}

/// Pre-rendered display lines, keyed by width class (spec §4.15).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedOutput {
    /// Width class -> ordered display lines, e.g. "80" -> ["...", "..."].
    pub by_width_class: std::collections::BTreeMap<String, Vec<String>>,
}

/// Full per-invocation health record (spec §3 "SessionHealth").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    pub session_id: String,
    pub project_path: String,
    pub transcript_path: String,
    pub first_seen: i64,
    pub gathered_at: i64,
    pub session_duration_ms: i64,

    pub launch: LaunchContext,
    pub transcript: TranscriptState,
    pub model: ModelInfo,
    pub context: ContextWindow,
    pub git: GitState,
    pub billing: Billing,
    pub alerts: Alerts,

    pub status: HealthStatus,
    pub issues: Vec<String>,

    pub formatted_output: FormattedOutput,
}
