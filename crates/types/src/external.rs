//! Read-through shapes for files owned by an out-of-scope external
//! collaborator (spec §6): `hot-swap-quota.json`, `merged-quota-cache.json`,
//! `slot-recommendation.json`. This crate never writes these files — only
//! validates and reads them via `AtomicFileStore::read_or_default`, so every
//! field is `#[serde(default)]` and unknown fields are tolerated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotSwapQuota {
    pub active_slot: Option<String>,
    pub slots: Vec<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergedQuotaCache {
    pub percent_used: Option<u32>,
    pub remaining_hours: Option<f64>,
    pub reset_day: Option<String>,
    pub fetched_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotRecommendation {
    pub recommended_slot: Option<String>,
    pub reason: Option<String>,
    pub computed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = r#"{"activeSlot":"a","slots":["a","b"],"updatedAt":5,"futureField":123}"#;
        let parsed: HotSwapQuota = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.active_slot.as_deref(), Some("a"));
        assert_eq!(parsed.slots, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_file_content_defaults() {
        let parsed: MergedQuotaCache = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, MergedQuotaCache::default());
    }
}
