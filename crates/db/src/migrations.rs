//! Inline SQL migrations for the telemetry database (spec §4.14 step 5, §6
//! `telemetry.db`).
//!
//! One small self-contained table, so inline migrations tracked by a
//! `_migrations` table (rather than sqlx's file-based migrator) are enough,
//! the same approach `claude-view-db`'s `migrations.rs` takes.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: telemetry_rows table.
    r#"
CREATE TABLE IF NOT EXISTS telemetry_rows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    slot_id TEXT,
    gathered_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    cost_today REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    secrets_detected INTEGER NOT NULL DEFAULT 0,
    transcript_stale INTEGER NOT NULL DEFAULT 0,
    data_loss_risk INTEGER NOT NULL DEFAULT 0
);
"#,
    // Migration 2: indexes for the retention sweep and per-session queries.
    r#"
CREATE INDEX IF NOT EXISTS idx_telemetry_rows_gathered_at ON telemetry_rows(gathered_at);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_telemetry_rows_session_id ON telemetry_rows(session_id);
"#,
];
