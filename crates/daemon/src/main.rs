//! `session-health-daemon` — one-shot binary invoked once per statusline
//! render (spec §6 "Stdin contract", §7 "Process model").
//!
//! Reads a `BrokerInput` JSON document from stdin, runs one `gatherAll`
//! invocation, writes every artifact `HealthRecordWriter` owns, and exits
//! 0 unconditionally — errors are logged, never propagated to the caller's
//! exit code, the same "never block the statusline" posture the teacher's
//! `claude-view-server` binary takes toward its own request handlers.

mod log_format;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use session_health_core::fetchers::{BillingFetcher, LocalBillingFetcher, LocalQuotaFetcher, NoopVersionFetcher, QuotaFetcher, VersionFetcher};
use session_health_core::gather_context::BrokerInput;
use session_health_core::health_record_writer::{HealthRecordWriter, NoopTelemetrySink, TelemetrySink};
use session_health_core::{freshness, sanitizer, sources};
use session_health_core::global_cache::GlobalCacheStore;
use session_health_core::session_lock::{is_valid_session_id, SessionLockStore};
use session_health_core::single_flight::SingleFlight;
use session_health_core::{format_all, GatherContext, UnifiedBroker};
use session_health_db::TelemetryDb;
use session_health_types::{BrokerConfig, FreshnessCategory, SessionHealth};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "session-health-daemon")]
struct Cli {
    /// Overrides `CLAUDE_SESSION_HEALTH_DIR` / the `~/.claude/session-health`
    /// default (spec §6 "Filesystem layout").
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

struct DbTelemetrySink(TelemetryDb);

#[async_trait]
impl TelemetrySink for DbTelemetrySink {
    async fn insert_row(&self, row: session_health_types::TelemetryRow) -> Result<(), String> {
        self.0.insert_row(row).await.map(|_| ()).map_err(|e| e.to_string())
    }
}

fn init_logging(config: &BrokerConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = config.base_dir.clone();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::never(&log_dir, "daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = tracing_subscriber::fmt::layer()
        .event_format(log_format::DaemonLogFormat)
        .with_writer(non_blocking)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| meta.target() != "telemetry"));

    let telemetry_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| meta.target() == "telemetry"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| meta.target() != "telemetry"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(telemetry_layer)
        .with(stderr_layer)
        .init();

    guard
}

fn read_stdin_input() -> Option<BrokerInput> {
    let mut buf = String::new();
    if std::io::stdin().read_to_string(&mut buf).is_err() {
        return None;
    }
    if buf.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&buf).ok()
}

fn billing_fetchers() -> (Arc<dyn BillingFetcher>, Arc<dyn QuotaFetcher>, Arc<dyn VersionFetcher>) {
    (Arc::new(LocalBillingFetcher), Arc::new(LocalQuotaFetcher), Arc::new(NoopVersionFetcher))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = BrokerConfig::resolve(cli.base_dir);
    let _guard = init_logging(&config);

    let Some(input) = read_stdin_input() else {
        tracing::warn!("no usable stdin input, exiting silently");
        return;
    };

    let Some(raw_session_id) = input.session_id.clone() else {
        tracing::warn!("missing session_id in stdin input, exiting silently");
        return;
    };
    let session_id = sanitizer::sanitize_session_id(&raw_session_id);

    if let Err(err) = run(&config, session_id, input).await {
        tracing::warn!(error = %err, "gather invocation failed");
    }
}

async fn run(config: &BrokerConfig, session_id: String, input: BrokerInput) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    let transcript_path = input
        .transcript_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.base_dir.join(format!("{session_id}.jsonl")));
    let project_path = input
        .start_directory
        .clone()
        .unwrap_or_else(|| std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_default());

    let existing_health: Option<SessionHealth> = {
        let path = config.session_health_path(&session_id);
        std::fs::read(&path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok())
    };

    let lock_store = SessionLockStore::new(config.base_dir.clone());
    if is_valid_session_id(&session_id) {
        let _ = lock_store.get_or_create(&session_id, "default", None, None, None, &transcript_path.display().to_string(), None);
    }

    let ctx = Arc::new(GatherContext::new(
        session_id.clone(),
        transcript_path,
        project_path,
        config.clone(),
        input,
        existing_health,
    ));

    let cache = GlobalCacheStore::new(config.data_cache_path());
    let single_flight = SingleFlight::new(config.refresh_intents_dir());

    let (billing, quota, version) = billing_fetchers();
    let registry = sources::default_registry(billing, quota, version);
    let broker = UnifiedBroker::new(registry);

    let outcome = broker.gather_all(ctx, &cache, &single_flight).await;
    let mut health = outcome.health;
    let now_ms = freshness::now_ms();
    health.formatted_output = format_all(&health, now_ms);

    let should_enforce_db_retention = freshness::should_refetch(&config.cooldowns_dir(), FreshnessCategory::Cleanup);

    let db_result = TelemetryDb::open(&config.telemetry_db_path()).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    match db_result {
        Ok(db) => {
            if should_enforce_db_retention {
                if let Err(err) = db.enforce_retention(now_ms).await {
                    tracing::warn!(error = %err, "telemetry retention sweep failed");
                }
            }
            let sink = DbTelemetrySink(db);
            HealthRecordWriter::new(config).write_all(&health, outcome.runs, duration_ms, &sink).await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "telemetry database unavailable, falling back to no-op sink");
            let sink = NoopTelemetrySink;
            HealthRecordWriter::new(config).write_all(&health, outcome.runs, duration_ms, &sink).await;
        }
    }

    Ok(())
}
