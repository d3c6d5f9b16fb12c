//! Local backups of contact form submissions.
//!
//! Used when the primary submission endpoint is unreachable. Writes are
//! best-effort and only the newest entries are kept.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Default number of backups retained.
pub const DEFAULT_BACKUP_LIMIT: usize = 50;

/// A contact form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Service the visitor is interested in.
    #[serde(default)]
    pub interest: String,
    #[serde(default)]
    pub message: String,
    /// Page or campaign the form was submitted from.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub submitted_at: String,
}

/// A stored backup.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FormBackup {
    pub key: String,
    pub data: ContactSubmission,
    pub timestamp: String,
}

impl CacheDb {
    /// Store a submission and trim to the newest `limit` backups.
    ///
    /// Returns the backup key (`form_backup_<timestamp>`).
    pub async fn save_backup(&self, data: &ContactSubmission, limit: usize) -> Result<String, Error> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
        let key = format!("form_backup_{timestamp}");
        let payload = serde_json::to_string(data)?;
        let limit = limit.max(1) as i64;

        let stored_key = key.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO form_backups (key, payload_json, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET payload_json = excluded.payload_json",
                    params![stored_key, payload, timestamp],
                )?;
                tx.execute(
                    "DELETE FROM form_backups WHERE id NOT IN (
                        SELECT id FROM form_backups ORDER BY id DESC LIMIT ?1
                    )",
                    params![limit],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(key = %key, "saved form backup");
        Ok(key)
    }

    /// All backups, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<FormBackup>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<FormBackup>, Error> {
                let mut stmt = conn.prepare("SELECT key, payload_json, created_at FROM form_backups ORDER BY id ASC")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(key, payload, timestamp)| -> Result<FormBackup, Error> {
                        let data = serde_json::from_str(&payload)?;
                        Ok(FormBackup { key, data, timestamp })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one backup. Returns whether it existed.
    pub async fn remove_backup(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM form_backups WHERE key = ?1", params![key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str) -> ContactSubmission {
        ContactSubmission {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: "+34 600 000 000".into(),
            interest: "chatbot".into(),
            message: "Hola".into(),
            source: "contact-page".into(),
            submitted_at: "2026-10-18T10:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = db.save_backup(&submission("Ana"), DEFAULT_BACKUP_LIMIT).await.unwrap();
        assert!(key.starts_with("form_backup_"));

        let backups = db.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].key, key);
        assert_eq!(backups[0].data, submission("Ana"));
    }

    #[tokio::test]
    async fn test_keeps_newest_only() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..5 {
            db.save_backup(&submission(&format!("User{i}")), 3).await.unwrap();
        }

        let names: Vec<String> = db.list_backups().await.unwrap().into_iter().map(|b| b.data.name).collect();
        assert_eq!(names, vec!["User2", "User3", "User4"]);
    }

    #[tokio::test]
    async fn test_remove_backup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = db.save_backup(&submission("Ana"), DEFAULT_BACKUP_LIMIT).await.unwrap();

        assert!(db.remove_backup(&key).await.unwrap());
        assert!(!db.remove_backup(&key).await.unwrap());
        assert!(db.list_backups().await.unwrap().is_empty());
    }
}
