//! Embedded telemetry database (spec §4.14 step 5, §6 `telemetry.db`).
//!
//! One-table SQLite store, opened in WAL mode the way `claude-view-db`'s
//! `Database::new` opens its own cache database: `journal_mode=WAL`,
//! `synchronous=NORMAL`, inline migrations tracked by a `_migrations`
//! table. Spec §9's open question on telemetry-database exclusivity
//! resolves in favor of this exact approach — WAL's concurrent-writer
//! semantics are what let many short-lived broker processes share one
//! file without an external lock.

mod migrations;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use session_health_types::TelemetryRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Rows older than this are eligible for the retention sweep (spec §4.14
/// step 5: "Retention 30 days, periodic cleanup with space reclaim").
pub const RETENTION_MS: i64 = 30 * 24 * 3_600_000;

/// Handle on the telemetry database, one pool per daemon process.
#[derive(Debug, Clone)]
pub struct TelemetryDb {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl TelemetryDb {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(10))
            .log_slow_statements(tracing::log::LevelFilter::Warn, std::time::Duration::from_secs(2));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool, db_path: path.to_owned() };
        db.run_migrations().await?;
        tracing::info!(path = %path.display(), "telemetry database opened");
        Ok(db)
    }

    /// In-memory handle for tests; shares the cache across pool
    /// connections so concurrent queries see the same database.
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        let db = Self { pool, db_path: PathBuf::new() };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Insert one invocation-grained telemetry row (spec §4.14 step 5).
    pub async fn insert_row(&self, row: TelemetryRow) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO telemetry_rows
                (session_id, slot_id, gathered_at, duration_ms, cost_today, status,
                 secrets_detected, transcript_stale, data_loss_risk)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.session_id)
        .bind(&row.slot_id)
        .bind(row.gathered_at)
        .bind(row.duration_ms)
        .bind(row.cost_today)
        .bind(&row.status)
        .bind(row.secrets_detected)
        .bind(row.transcript_stale)
        .bind(row.data_loss_risk)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent rows for one session, newest first.
    pub async fn recent_rows_for_session(&self, session_id: &str, limit: i64) -> DbResult<Vec<TelemetryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, slot_id, gathered_at, duration_ms, cost_today, status,
                   secrets_detected, transcript_stale, data_loss_risk
            FROM telemetry_rows
            WHERE session_id = ?
            ORDER BY gathered_at DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_telemetry_row).collect())
    }

    /// Delete rows older than `RETENTION_MS` and reclaim space (spec §4.14
    /// step 5: "periodic cleanup with space reclaim"). Returns the number
    /// of rows deleted.
    pub async fn enforce_retention(&self, now_ms: i64) -> DbResult<u64> {
        let cutoff = now_ms - RETENTION_MS;
        let result = sqlx::query("DELETE FROM telemetry_rows WHERE gathered_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            sqlx::query("VACUUM").execute(&self.pool).await?;
        }
        Ok(deleted)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_telemetry_row(row: &sqlx::sqlite::SqliteRow) -> TelemetryRow {
    TelemetryRow {
        id: row.try_get("id").ok(),
        session_id: row.try_get("session_id").unwrap_or_default(),
        slot_id: row.try_get("slot_id").ok(),
        gathered_at: row.try_get("gathered_at").unwrap_or(0),
        duration_ms: row.try_get("duration_ms").unwrap_or(0),
        cost_today: row.try_get("cost_today").unwrap_or(0.0),
        status: row.try_get("status").unwrap_or_default(),
        secrets_detected: row.try_get("secrets_detected").unwrap_or(false),
        transcript_stale: row.try_get("transcript_stale").unwrap_or(false),
        data_loss_risk: row.try_get("data_loss_risk").unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(session_id: &str, gathered_at: i64) -> TelemetryRow {
        TelemetryRow {
            id: None,
            session_id: session_id.to_string(),
            slot_id: None,
            gathered_at,
            duration_ms: 42,
            cost_today: 1.23,
            status: "healthy".to_string(),
            secrets_detected: false,
            transcript_stale: false,
            data_loss_risk: false,
        }
    }

    #[tokio::test]
    async fn insert_then_read_back_round_trips() {
        let db = TelemetryDb::open_in_memory().await.unwrap();
        let id = db.insert_row(sample_row("s1", 1_000)).await.unwrap();
        assert!(id > 0);

        let rows = db.recent_rows_for_session("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_id, "s1");
        assert_eq!(rows[0].duration_ms, 42);
    }

    #[tokio::test]
    async fn recent_rows_ordered_newest_first() {
        let db = TelemetryDb::open_in_memory().await.unwrap();
        db.insert_row(sample_row("s1", 1_000)).await.unwrap();
        db.insert_row(sample_row("s1", 2_000)).await.unwrap();
        db.insert_row(sample_row("s1", 3_000)).await.unwrap();

        let rows = db.recent_rows_for_session("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].gathered_at, 3_000);
        assert_eq!(rows[2].gathered_at, 1_000);
    }

    #[tokio::test]
    async fn retention_deletes_rows_older_than_30_days() {
        let db = TelemetryDb::open_in_memory().await.unwrap();
        let now = 100 * 24 * 3_600_000i64;
        db.insert_row(sample_row("old", now - RETENTION_MS - 1)).await.unwrap();
        db.insert_row(sample_row("new", now)).await.unwrap();

        let deleted = db.enforce_retention(now).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = db.recent_rows_for_session("old", 10).await.unwrap();
        assert!(remaining.is_empty());
        let remaining = db.recent_rows_for_session("new", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");
        {
            let db = TelemetryDb::open(&path).await.unwrap();
            db.insert_row(sample_row("s1", 1_000)).await.unwrap();
        }
        let db = TelemetryDb::open(&path).await.unwrap();
        let rows = db.recent_rows_for_session("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
