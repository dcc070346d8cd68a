//! Broker-wide configuration threaded through every gather.

use std::path::PathBuf;

/// Absolute wall-clock budget for one `gatherAll` invocation (spec §4.13 step 1).
pub const DEFAULT_DEADLINE_MS: u64 = 20_000;

/// Environment variable that overrides the base directory, mirroring
/// `claude-view-server`'s `CLAUDE_VIEW_PORT` env-with-fallback pattern.
pub const BASE_DIR_ENV_VAR: &str = "CLAUDE_SESSION_HEALTH_DIR";

/// Knobs for one broker invocation. Constructed once per process and
/// threaded through `GatherContext`; never mutated after construction.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Base directory, canonically `~/.claude/session-health/` (spec §6).
    pub base_dir: PathBuf,
    /// Absolute deadline budget in milliseconds (spec §4.13).
    pub deadline_ms: u64,
    /// Minutes of transcript inactivity after which it is considered stale
    /// for `alerts.transcriptStale` (spec §4.13 step 6).
    pub transcript_staleness_minutes: u64,
}

impl BrokerConfig {
    /// Resolve the base directory from (in priority order): an explicit
    /// override, the `CLAUDE_SESSION_HEALTH_DIR` env var, or the default
    /// `~/.claude/session-health/`.
    pub fn resolve(base_dir_override: Option<PathBuf>) -> Self {
        let base_dir = base_dir_override
            .or_else(|| std::env::var_os(BASE_DIR_ENV_VAR).map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|h| h.join(".claude").join("session-health")))
            .unwrap_or_else(|| PathBuf::from(".claude-session-health"));

        Self {
            base_dir,
            deadline_ms: DEFAULT_DEADLINE_MS,
            transcript_staleness_minutes: 10,
        }
    }

    pub fn cooldowns_dir(&self) -> PathBuf {
        self.base_dir.join("cooldowns")
    }

    pub fn refresh_intents_dir(&self) -> PathBuf {
        self.base_dir.join("refresh-intents")
    }

    pub fn session_health_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.json"))
    }

    pub fn session_debug_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.debug.json"))
    }

    pub fn session_lock_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.lock"))
    }

    pub fn sessions_summary_path(&self) -> PathBuf {
        self.base_dir.join("sessions.json")
    }

    pub fn publish_path(&self) -> PathBuf {
        self.base_dir.join("publish-health.json")
    }

    pub fn telemetry_dashboard_path(&self) -> PathBuf {
        self.base_dir.join("telemetry.json")
    }

    pub fn notifications_path(&self) -> PathBuf {
        self.base_dir.join("notifications.json")
    }

    pub fn data_cache_path(&self) -> PathBuf {
        self.base_dir.join("data-cache.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("daemon.log")
    }

    pub fn telemetry_db_path(&self) -> PathBuf {
        self.base_dir.join("telemetry.db")
    }

    /// External collaborator's read-through cache for the `Quota` freshness
    /// category (spec §4.17); this crate never writes it.
    pub fn merged_quota_cache_path(&self) -> PathBuf {
        self.base_dir.join("merged-quota-cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        let cfg = BrokerConfig::resolve(Some(PathBuf::from("/tmp/explicit")));
        assert_eq!(cfg.base_dir, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn paths_are_namespaced_under_base_dir() {
        let cfg = BrokerConfig::resolve(Some(PathBuf::from("/tmp/base")));
        assert_eq!(
            cfg.session_health_path("abc-1"),
            PathBuf::from("/tmp/base/abc-1.json")
        );
        assert_eq!(
            cfg.cooldowns_dir(),
            PathBuf::from("/tmp/base/cooldowns")
        );
    }
}
