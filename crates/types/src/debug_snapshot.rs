//! `<sessionId>.debug.json` shape (spec §4.14 step 2, §3 `FetchOutcome`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::enums::FreshnessStatus;

/// One attempt to fetch a data source, redacted and duration-stamped
/// (spec §4.14: "ring buffer of last 20 attempts with duration and
/// redacted error").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAttempt {
    pub source_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub at: i64,
}

/// Max fetch attempts retained per debug snapshot.
pub const FETCH_HISTORY_CAP: usize = 20;

/// Overall data-quality verdict for one gather (spec §4.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Complete,
    Partial,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessReportEntry {
    pub category: String,
    pub status: FreshnessStatus,
    pub age_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub session_id: String,
    pub gathered_at: i64,
    pub freshness_report: Vec<FreshnessReportEntry>,
    pub fetch_history: Vec<FetchAttempt>,
    pub pending_intents: Vec<String>,
    pub active_cooldowns: Vec<String>,
    pub data_quality: Option<DataQuality>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A bounded ring buffer of the last `FETCH_HISTORY_CAP` fetch attempts.
#[derive(Debug, Clone, Default)]
pub struct FetchHistory {
    attempts: std::collections::VecDeque<FetchAttempt>,
}

impl FetchHistory {
    pub fn push(&mut self, attempt: FetchAttempt) {
        if self.attempts.len() >= FETCH_HISTORY_CAP {
            self.attempts.pop_front();
        }
        self.attempts.push_back(attempt);
    }

    pub fn into_vec(self) -> Vec<FetchAttempt> {
        self.attempts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_caps_at_20_and_drops_oldest() {
        let mut history = FetchHistory::default();
        for i in 0..25 {
            history.push(FetchAttempt {
                source_id: format!("src-{i}"),
                success: true,
                duration_ms: 1,
                error: None,
                at: i,
            });
        }
        let v = history.into_vec();
        assert_eq!(v.len(), FETCH_HISTORY_CAP);
        assert_eq!(v.first().unwrap().source_id, "src-5");
        assert_eq!(v.last().unwrap().source_id, "src-24");
    }
}
