// crates/core/src/gather_context.rs
//! `GatherContext` — carried through one `gatherAll` invocation (spec §4.13
//! step 1). Holds everything a source's `fetch`/`merge` needs without
//! reaching for process-global state, matching §9's "dependency passing via
//! explicit context structs replaces implicit module-global state".

use std::path::PathBuf;
use std::time::Instant;

use session_health_types::{BrokerConfig, SessionHealth};

/// Raw stdin JSON contract (spec §6 "Stdin contract"), validated just
/// enough to be usable; unknown fields are ignored via `serde(default)` on
/// each nested struct's consumers rather than here.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrokerInput {
    pub session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub start_directory: Option<String>,
    #[serde(default)]
    pub model: ModelInput,
    #[serde(default)]
    pub context_window: ContextWindowInput,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ModelInput {
    pub display_name: Option<String>,
    pub id: Option<String>,
    pub model_id: Option<String>,
    pub name: Option<String>,
}

impl ModelInput {
    /// First of `display_name, id, model_id, name` that is present (spec §6:
    /// "any one suffices").
    pub fn resolve(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.id.as_deref())
            .or(self.model_id.as_deref())
            .or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextWindowInput {
    pub context_window_size: Option<u64>,
    #[serde(default)]
    pub current_usage: CurrentUsageInput,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CurrentUsageInput {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cache_read_input_tokens: Option<i64>,
    pub cache_creation_input_tokens: Option<i64>,
}

impl CurrentUsageInput {
    /// Sum of the four usage counters, each clamped to zero if negative or
    /// absent (spec §4.10: "negative or non-numeric token counts are
    /// clamped to zero").
    pub fn total_tokens_used(&self) -> u64 {
        [
            self.input_tokens,
            self.output_tokens,
            self.cache_read_input_tokens,
            self.cache_creation_input_tokens,
        ]
        .into_iter()
        .map(|v| v.unwrap_or(0).max(0) as u64)
        .sum()
    }
}

/// Everything one `gatherAll` invocation threads through its sources (spec
/// §4.13 step 1).
pub struct GatherContext {
    pub session_id: String,
    pub transcript_path: PathBuf,
    pub project_path: String,
    pub config: BrokerConfig,
    pub input: BrokerInput,
    /// Absolute deadline, measured from `started_at` (spec §4.13 step 1:
    /// `now + DEADLINE_MS`).
    pub started_at: Instant,
    pub deadline_ms: u64,
    pub existing_health: Option<SessionHealth>,
}

impl GatherContext {
    pub fn new(
        session_id: String,
        transcript_path: PathBuf,
        project_path: String,
        config: BrokerConfig,
        input: BrokerInput,
        existing_health: Option<SessionHealth>,
    ) -> Self {
        let deadline_ms = config.deadline_ms;
        Self {
            session_id,
            transcript_path,
            project_path,
            config,
            input,
            started_at: Instant::now(),
            deadline_ms,
            existing_health,
        }
    }

    /// Milliseconds remaining until the absolute deadline, floored at 0.
    pub fn deadline_remaining_ms(&self) -> u64 {
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        self.deadline_ms.saturating_sub(elapsed)
    }

    /// The per-source budget for a descriptor: `min(descriptor.timeoutMs,
    /// deadlineRemaining)` (spec §4.13 step 4).
    pub fn source_budget_ms(&self, descriptor_timeout_ms: u64) -> u64 {
        descriptor_timeout_ms.min(self.deadline_remaining_ms())
    }
}
