// crates/core/src/source_registry.rs
//! `SourceRegistry` — typed descriptor table of data sources (spec §4.7).

use async_trait::async_trait;
use session_health_types::{FreshnessCategory, SessionHealth, Tier};

use crate::gather_context::GatherContext;

/// Result of one source fetch. `Timeout` is distinct from `Failed` so the
/// debug snapshot (spec §4.14 step 2) and the `⚠`/`🔺` indicator logic can
/// tell "ran out of time" apart from "the fetch itself errored".
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    Ok(T),
    Failed(String),
    Timeout,
}

impl<T> FetchOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            FetchOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn error_label(&self) -> Option<&str> {
        match self {
            FetchOutcome::Ok(_) => None,
            FetchOutcome::Failed(msg) => Some(msg.as_str()),
            FetchOutcome::Timeout => Some("timeout"),
        }
    }
}

/// A typed data-source descriptor (spec §3 "DataSourceDescriptor", §4.7).
///
/// `fetch` is side-effect-free with respect to the final `SessionHealth`
/// record — it only produces `data`. `merge` is pure and writes `data`
/// into disjoint fields of `health` so that Tier-2/Tier-3 parallel merges
/// never race each other (spec §4.13 "Ordering and tie-break rules").
#[async_trait]
pub trait DataSourceDescriptor: Send + Sync {
    /// Stable identifier, e.g. `"billing_ccusage"`, `"git_status"`.
    fn id(&self) -> &str;
    fn tier(&self) -> Tier;
    fn freshness_category(&self) -> FreshnessCategory;
    /// Upper bound, in ms, on how long this source's fetch may block the
    /// orchestrator (spec §3 "DataSourceDescriptor").
    fn timeout_ms(&self) -> u64;
    /// Whether this source reads/writes through the Tier-3 global cache.
    /// Tier-1/Tier-2 descriptors always return `false`.
    fn uses_global_cache(&self) -> bool {
        false
    }

    async fn fetch(&self, ctx: &GatherContext) -> FetchOutcome<serde_json::Value>;
    fn merge(&self, health: &mut SessionHealth, data: serde_json::Value);
}

/// Process-global map `{id -> descriptor}` with insertion-order iteration
/// (spec §4.7, §9 "Open question: descriptor order determinism" — an
/// order-preserving structure is required because merge order within a
/// tier is registration order).
#[derive(Default)]
pub struct SourceRegistry {
    order: Vec<String>,
    descriptors: std::collections::HashMap<String, std::sync::Arc<dyn DataSourceDescriptor>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is idempotent; re-registering an id overwrites the
    /// descriptor but keeps its original position in iteration order.
    pub fn register(&mut self, descriptor: std::sync::Arc<dyn DataSourceDescriptor>) {
        let id = descriptor.id().to_string();
        if !self.descriptors.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.descriptors.insert(id, descriptor);
    }

    /// `getByTier(t)`: descriptors for tier `t`, in registration order.
    pub fn get_by_tier(&self, tier: Tier) -> Vec<std::sync::Arc<dyn DataSourceDescriptor>> {
        self.order
            .iter()
            .filter_map(|id| self.descriptors.get(id))
            .filter(|d| d.tier() == tier)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<std::sync::Arc<dyn DataSourceDescriptor>> {
        self.descriptors.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
