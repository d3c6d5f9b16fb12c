//! Schema for partitions, form backups and the activation record.
//!
//! `_migrations` holds one row per applied batch. On open, every batch with a
//! higher number than the newest row runs in order:
//!
//! 1. `partitions` and `entries`: named partitions and their captured responses
//! 2. `form_backups`: local copies of contact submissions
//! 3. `worker_state`: which version finished activating, read back on restart

use super::Error;
use tokio_rusqlite::{Connection, params};

const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_partitions.sql")),
    (2, include_str!("../../migrations/002_form_backups.sql")),
    (3, include_str!("../../migrations/003_worker_state.sql")),
];

/// Bring the schema up to date. Safe to call on every open.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let applied: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql).map_err(|e| Error::MigrationFailed(format!("{version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "schema migrated");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
