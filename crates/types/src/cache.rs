//! `GlobalDataCache` — shared cross-session Tier-3 cache (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk schema version for `data-cache.json` (spec §6).
pub const DATA_CACHE_SCHEMA_VERSION: u32 = 2;

/// One cached Tier-3 source's last-known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub fetched_at: i64,
    pub fetched_by: u32,
}

/// Shared cross-session cache of Tier-3 data (spec §3 "GlobalDataCache",
/// §6 "data-cache.json").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDataCache {
    #[serde(default = "default_schema_version")]
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_schema_version() -> u32 {
    DATA_CACHE_SCHEMA_VERSION
}

impl GlobalDataCache {
    pub fn empty() -> Self {
        Self {
            version: DATA_CACHE_SCHEMA_VERSION,
            entries: BTreeMap::new(),
            updated_at: 0,
        }
    }

    pub fn age_ms(&self, source_id: &str, now_ms: i64) -> i64 {
        match self.entries.get(source_id) {
            Some(e) => (now_ms - e.fetched_at).max(0),
            None => i64::MAX,
        }
    }
}
