//! Embedded telemetry log row (spec §4.14 step 5, §6 `telemetry.db`).

use serde::{Deserialize, Serialize};

/// One invocation-grained telemetry row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRow {
    pub id: Option<i64>,
    pub session_id: String,
    pub slot_id: Option<String>,
    pub gathered_at: i64,
    pub duration_ms: i64,
    pub cost_today: f64,
    pub status: String,
    pub secrets_detected: bool,
    pub transcript_stale: bool,
    pub data_loss_risk: bool,
}

/// Telemetry dashboard JSON shape (spec §6 `telemetry.json`): all active
/// sessions' current one-line rendering, freshness per category, pending
/// intents, active cooldowns. Auto-prunes entries inactive > 2h.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryDashboardEntry {
    pub session_id: String,
    pub one_line: String,
    pub status: String,
    pub gathered_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryDashboard {
    pub sessions: Vec<TelemetryDashboardEntry>,
    pub freshness: std::collections::BTreeMap<String, String>,
    pub pending_intents: Vec<String>,
    pub active_cooldowns: Vec<String>,
    pub updated_at: i64,
}

/// One entry in the outbound publish contract (spec §6 `publish-health.json`,
/// glossary "Publish file").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEntry {
    pub session_id: String,
    pub project_path: String,
    pub status: String,
    pub urgency_score: u32,
    pub last_active_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFile {
    pub sessions: Vec<PublishEntry>,
    pub updated_at: i64,
}

/// Global summary file (spec §6 `sessions.json`): list + alert indices for
/// fast cross-session queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryEntry {
    pub session_id: String,
    pub status: String,
    pub gathered_at: i64,
    pub has_secrets: bool,
    pub has_data_loss_risk: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsSummary {
    pub sessions: Vec<SessionSummaryEntry>,
    /// Indices into `sessions` with `hasSecrets == true`.
    pub secret_alert_indices: Vec<usize>,
    /// Indices into `sessions` with `hasDataLossRisk == true`.
    pub data_loss_indices: Vec<usize>,
    pub updated_at: i64,
}
