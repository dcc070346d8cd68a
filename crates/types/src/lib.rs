//! Wire/data model shared across the session-health broker workspace.
//!
//! Mirrors `claude-view-types`'s role: a leaf crate with no logic, only
//! the shapes every other crate serializes to or deserializes from.

pub mod cache;
pub mod config;
pub mod debug_snapshot;
pub mod durable;
pub mod enums;
pub mod external;
pub mod health;
pub mod lock;
pub mod notification;
pub mod telemetry;

pub use cache::{CacheEntry, GlobalDataCache};
pub use config::BrokerConfig;
pub use debug_snapshot::{DataQuality, DebugSnapshot, FetchAttempt, FetchHistory, FreshnessReportEntry};
pub use durable::DurableSessionState;
pub use enums::{
    DetectionMethod, FreshnessCategory, FreshnessStatus, HealthStatus, ModelSource,
    NotificationType, SecretType, Tier,
};
pub use external::{HotSwapQuota, MergedQuotaCache, SlotRecommendation};
pub use health::{
    Alerts, Billing, ContextWindow, GitState, LaunchContext, ModelInfo, SecretFinding,
    SessionHealth, TranscriptState, WeeklyBudget,
};
pub use lock::{SessionLock, SessionLockIdentity, SessionLockMutable, SessionLockUpdate};
pub use notification::{NotificationRecord, NotificationStoreFile};
pub use telemetry::{
    PublishEntry, PublishFile, SessionSummaryEntry, SessionsSummary, TelemetryDashboard,
    TelemetryDashboardEntry, TelemetryRow,
};
