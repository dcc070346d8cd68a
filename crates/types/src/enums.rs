//! Sum types for the fields the design notes (§9) call out as dynamic
//! JSON in the source system: `DetectionMethod`, `HealthStatus`,
//! `NotificationType`, plus the freshness verdict and alert taxonomy.

use serde::{Deserialize, Serialize};

/// How the active auth profile was resolved (spec §3 launch context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Env,
    Path,
    Fingerprint,
    Default,
}

impl Default for DetectionMethod {
    fn default() -> Self {
        Self::Default
    }
}

/// Where the display model name came from (spec §3 model block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Transcript,
    Input,
    Settings,
    Default,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Default
    }
}

/// Overall per-session health status (spec §4.13 "Overall health computation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Freshness verdict for a timestamp within a category (spec §4.3, invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessStatus {
    Fresh,
    Stale,
    Critical,
    Unknown,
}

impl FreshnessStatus {
    /// Context-free indicator glyph (spec §4.3): only `fresh` vs not is knowable
    /// without refresh-intent/cooldown context; see `freshness::context_aware_indicator`
    /// for the full decision table.
    pub fn bare_indicator(self) -> &'static str {
        match self {
            FreshnessStatus::Fresh | FreshnessStatus::Unknown => "",
            FreshnessStatus::Stale => "",
            FreshnessStatus::Critical => "\u{1f53a}", // 🔺
        }
    }
}

/// Kind of detected secret (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    GenericApiKey,
    AwsAccessKey,
    VcsToken,
    PrivateKey,
    UrlCredential,
}

/// Notification kind (spec §3 `NotificationRecord`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    VersionUpdate,
    SlotSwitch,
    RestartReady,
}

/// Data-source latency tier (spec §4.7, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    One = 1,
    Two = 2,
    Three = 3,
}

/// Freshness bucket a data source belongs to (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessCategory {
    Billing,
    LocalCost,
    Quota,
    Git,
    Transcript,
    Model,
    Secrets,
    Context,
    Version,
    WeeklyQuota,
    /// Own cooldown category the CleanupSweeper uses for its 24h cadence.
    Cleanup,
}

impl FreshnessCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FreshnessCategory::Billing => "billing",
            FreshnessCategory::LocalCost => "local-cost",
            FreshnessCategory::Quota => "quota",
            FreshnessCategory::Git => "git",
            FreshnessCategory::Transcript => "transcript",
            FreshnessCategory::Model => "model",
            FreshnessCategory::Secrets => "secrets",
            FreshnessCategory::Context => "context",
            FreshnessCategory::Version => "version",
            FreshnessCategory::WeeklyQuota => "weekly-quota",
            FreshnessCategory::Cleanup => "cleanup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_defaults_unknown() {
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }

    #[test]
    fn category_as_str_matches_filesystem_names() {
        assert_eq!(FreshnessCategory::LocalCost.as_str(), "local-cost");
        assert_eq!(FreshnessCategory::WeeklyQuota.as_str(), "weekly-quota");
    }
}
