//! `DurableSessionState` — lossy compacted serialization (spec §3).

use serde::{Deserialize, Serialize};

/// Maximum issues retained in the compacted form.
pub const MAX_ISSUES: usize = 3;
/// Maximum characters per compacted issue (including the trailing `…`).
pub const MAX_ISSUE_CHARS: usize = 50;

/// Alert bitmask bit order (stable — part of the wire contract).
pub mod alert_bits {
    pub const SECRETS_DETECTED: u16 = 1 << 0;
    pub const TRANSCRIPT_STALE: u16 = 1 << 1;
    pub const DATA_LOSS_RISK: u16 = 1 << 2;
}

/// Lossy, size-bounded serialization of `SessionHealth` used for optional
/// external sync (spec §3 "DurableSessionState", target size < 5 KB).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableSessionState {
    pub session_id: String,
    pub auth_profile_id: String,
    pub status: String,
    pub issues: Vec<String>,

    /// USD cents, e.g. $4.237 -> 424.
    pub cost_today_cents: i32,
    pub session_cost_cents: i32,
    pub burn_rate_cents_per_hour: i32,

    pub total_tokens: u64,
    pub tokens_per_minute_x100: u64,

    pub model: String,
    /// 0..=100.
    pub model_confidence: u8,

    pub tokens_used: u64,
    pub tokens_left: u64,
    pub percent_used: u32,

    pub alert_bitmask: u16,

    pub weekly_percent: Option<u32>,
    pub git_branch: Option<String>,

    /// 32-bit FNV-1a over all fields above, as 8 lowercase hex digits.
    /// Excluded from its own computation (spec invariant 7).
    pub hash: String,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_roundtrips_through_json() {
        let state = DurableSessionState::default();
        let json = serde_json::to_string(&state).unwrap();
        let back: DurableSessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
